pub mod expense;
pub mod trip;

pub use expense::{Expense, ExpenseCategory, NewExpense};
pub use trip::{Trip, TripSummary, DEFAULT_TRIP_NAME};
