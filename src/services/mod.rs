// 旅行データの保存・同期・転送を担うサービス群

pub mod currency;
pub mod document_client;
pub mod local_store;
pub mod save_scheduler;
pub mod sync;
pub mod transfer;
pub mod trip_view;

#[cfg(test)]
pub(crate) mod testing;

pub use currency::format_currency;
pub use document_client::{DocumentStore, HttpDocumentStore};
pub use local_store::LocalStore;
pub use sync::{document_id_from_url, resolve, SyncCoordinator, SyncEvent, SyncWinner};
pub use trip_view::{Notification, NotificationLevel, SharingStatus, TripView};
