//! Derived invoice fields as pure functions.
//!
//! Callers recompute explicitly after changing a dependency: the aggregate on
//! create and on template change, the invoices projection when a student is
//! renamed.

use chrono::NaiveDate;

use schoolerp_core::DomainError;
use schoolerp_school::{TemplateItem, TemplateSnapshot, TemplateState};

/// Invoice number used when the sequence is unconfigured or exhausted.
pub const NUMBER_PLACEHOLDER: &str = "/";

/// `"<student>-<template>"` when a template is set, else the student name.
pub fn combination(student_name: &str, template_name: Option<&str>) -> String {
    match template_name {
        Some(template_name) => format!("{student_name}-{template_name}"),
        None => student_name.to_string(),
    }
}

/// The invoice's line items: exactly the template's items, or none.
pub fn items_from_template(template: Option<&TemplateSnapshot>) -> Vec<TemplateItem> {
    template.map(|t| t.items.clone()).unwrap_or_default()
}

/// Draft templates are not billable.
pub fn ensure_template_usable(template: &TemplateSnapshot) -> Result<(), DomainError> {
    if template.state == TemplateState::Draft {
        return Err(DomainError::validation(format!(
            "invoice template '{}' is still a draft",
            template.name
        )));
    }
    Ok(())
}

/// Explicit amount wins; otherwise the template total.
pub fn resolve_amount(
    explicit: Option<u64>,
    template: Option<&TemplateSnapshot>,
) -> Result<u64, DomainError> {
    if let Some(amount) = explicit {
        return Ok(amount);
    }
    match template {
        Some(t) => t
            .total()
            .ok_or_else(|| DomainError::invariant("template total overflow")),
        None => Err(DomainError::validation("amount is required")),
    }
}

/// `due_date >= date`.
pub fn check_due_date(date: NaiveDate, due_date: NaiveDate) -> Result<(), DomainError> {
    if due_date < date {
        return Err(DomainError::validation(
            "due date cannot be earlier than the invoice date",
        ));
    }
    Ok(())
}

/// Render cents as `units.cents` (e.g. `52500` → `"525.00"`).
pub fn format_amount(cents: u64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use schoolerp_school::TemplateId;

    fn template(state: TemplateState) -> TemplateSnapshot {
        TemplateSnapshot {
            template_id: TemplateId::generate(),
            name: "Term 1".to_string(),
            state,
            items: vec![
                TemplateItem {
                    description: "Tuition".to_string(),
                    amount: 40_000,
                },
                TemplateItem {
                    description: "Meals".to_string(),
                    amount: 5_050,
                },
            ],
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn combination_joins_student_and_template() {
        assert_eq!(combination("Ada", Some("Term 1")), "Ada-Term 1");
        assert_eq!(combination("Ada", None), "Ada");
    }

    #[test]
    fn items_mirror_template_or_are_empty() {
        let t = template(TemplateState::Published);
        assert_eq!(items_from_template(Some(&t)), t.items);
        assert!(items_from_template(None).is_empty());
    }

    #[test]
    fn amount_defaults_to_template_total() {
        let t = template(TemplateState::Published);
        assert_eq!(resolve_amount(None, Some(&t)).unwrap(), 45_050);
        assert_eq!(resolve_amount(Some(10), Some(&t)).unwrap(), 10);
        assert!(matches!(
            resolve_amount(None, None),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn draft_template_is_not_usable() {
        assert!(ensure_template_usable(&template(TemplateState::Draft)).is_err());
        assert!(ensure_template_usable(&template(TemplateState::Published)).is_ok());
    }

    #[test]
    fn due_date_on_or_after_date() {
        assert!(check_due_date(day(2024, 1, 10), day(2024, 1, 10)).is_ok());
        assert!(check_due_date(day(2024, 1, 10), day(2024, 2, 1)).is_ok());
        assert!(check_due_date(day(2024, 1, 10), day(2024, 1, 9)).is_err());
    }

    #[test]
    fn amounts_render_with_two_decimals() {
        assert_eq!(format_amount(0), "0.00");
        assert_eq!(format_amount(5), "0.05");
        assert_eq!(format_amount(52_500), "525.00");
    }
}
