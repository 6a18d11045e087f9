use crate::models::Category;

/// Keyword rules, checked top to bottom; the first rule with any keyword
/// present in the text decides the category. Screening mails are routed to
/// `Other` before the exam rule can claim them for "test".
pub const RULES: &[(&[&str], Category)] = &[
    (&["screening"], Category::Other),
    (&["interview"], Category::Interview),
    (&["exam", "test"], Category::Exam),
    (&["registration", "apply"], Category::Registration),
];

pub fn classify(text: &str) -> Category {
    let lower = text.to_lowercase();
    RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(_, category)| *category)
        .unwrap_or(Category::Other)
}
