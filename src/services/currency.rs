/// コロンビア・ペソ表記（小数なし、3桁ごとに "."）で金額を整形する
///
/// 例: 1000000 → "$ 1.000.000"、-600000 → "-$ 600.000"
pub fn format_currency(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    if amount < 0 {
        format!("-$ {grouped}")
    } else {
        format!("$ {grouped}")
    }
}
