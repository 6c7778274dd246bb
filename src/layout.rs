//! Page layouts produced by the dashboard's card-layout builder.
//!
//! The builder arranges cards in sections; the server stores the resulting
//! document per page and rejects layouts the public site could not render.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::slug::validate_slug;

pub const MAX_COLUMNS: u8 = 4;

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct PageLayout {
    /// Page key, e.g. `home` or `about`. Filled from the URL on save.
    #[serde(default)]
    pub page: String,
    pub sections: Vec<LayoutSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct LayoutSection {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub columns: u8,
    pub cards: Vec<LayoutCard>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, TS, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum CardKind {
    Post,
    Image,
    Text,
    LabelFeed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, TS, ToSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum CardVariant {
    #[default]
    Plain,
    Elevated,
    Outlined,
    Overlay,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct CardStyle {
    #[serde(default)]
    pub variant: CardVariant,
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub accent: Option<String>,
    /// Number of columns the card occupies.
    #[serde(default = "default_span")]
    pub span: u8,
}

fn default_span() -> u8 {
    1
}

impl Default for CardStyle {
    fn default() -> Self {
        Self {
            variant: CardVariant::Plain,
            background: None,
            accent: None,
            span: default_span(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct LayoutCard {
    pub id: String,
    pub kind: CardKind,
    #[serde(default)]
    pub post_id: Option<Uuid>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub label_slug: Option<String>,
    #[serde(default)]
    pub style: CardStyle,
}

/// StoredLayout
///
/// A saved layout with its bookkeeping columns.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct StoredLayout {
    pub layout: PageLayout,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<Uuid>,
}

/// `#rgb` or `#rrggbb`.
pub fn is_hex_color(value: &str) -> bool {
    match value.strip_prefix('#') {
        Some(hex) => (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

fn check_card(card: &LayoutCard, columns: u8, errors: &mut Vec<String>) {
    let at = format!("card '{}'", card.id);

    let missing = match card.kind {
        CardKind::Post => card.post_id.is_none().then_some("post_id"),
        CardKind::Image => card
            .image_url
            .as_deref()
            .is_none_or(|u| u.trim().is_empty())
            .then_some("image_url"),
        CardKind::Text => card
            .text
            .as_deref()
            .is_none_or(|t| t.trim().is_empty())
            .then_some("text"),
        CardKind::LabelFeed => card.label_slug.is_none().then_some("label_slug"),
    };
    if let Some(field) = missing {
        errors.push(format!("{at}: {field} is required for this card kind"));
    }

    if let Some(slug) = &card.label_slug {
        if validate_slug(slug).is_err() {
            errors.push(format!("{at}: label_slug '{slug}' is not a valid slug"));
        }
    }

    if card.style.span == 0 || card.style.span > columns {
        errors.push(format!(
            "{at}: span {} must be between 1 and {columns}",
            card.style.span
        ));
    }

    for (name, color) in [("background", &card.style.background), ("accent", &card.style.accent)] {
        if let Some(color) = color {
            if !is_hex_color(color) {
                errors.push(format!("{at}: {name} '{color}' is not a hex color"));
            }
        }
    }
}

/// validate_layout
///
/// Collects every problem instead of stopping at the first, so the builder can
/// highlight all offending cards at once.
pub fn validate_layout(layout: &PageLayout) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if let Err(e) = validate_slug(&layout.page) {
        errors.push(format!("page '{}': {e}", layout.page));
    }

    let mut section_ids = HashSet::new();
    let mut card_ids = HashSet::new();

    for section in &layout.sections {
        if section.id.trim().is_empty() {
            errors.push("section id must not be empty".to_string());
        } else if !section_ids.insert(section.id.as_str()) {
            errors.push(format!("duplicate section id '{}'", section.id));
        }

        if section.columns == 0 || section.columns > MAX_COLUMNS {
            errors.push(format!(
                "section '{}': columns must be between 1 and {MAX_COLUMNS}",
                section.id
            ));
        }
        let columns = section.columns.clamp(1, MAX_COLUMNS);

        for card in &section.cards {
            if card.id.trim().is_empty() {
                errors.push(format!("section '{}': card id must not be empty", section.id));
            } else if !card_ids.insert(card.id.as_str()) {
                errors.push(format!("duplicate card id '{}'", card.id));
            }
            check_card(card, columns, &mut errors);
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_card(id: &str) -> LayoutCard {
        LayoutCard {
            id: id.to_string(),
            kind: CardKind::Text,
            post_id: None,
            image_url: None,
            text: Some("hello".to_string()),
            label_slug: None,
            style: CardStyle::default(),
        }
    }

    fn layout(cards: Vec<LayoutCard>) -> PageLayout {
        PageLayout {
            page: "home".to_string(),
            sections: vec![LayoutSection {
                id: "hero".to_string(),
                title: None,
                columns: 2,
                cards,
            }],
        }
    }

    #[test]
    fn accepts_well_formed_layout() {
        let mut wide = text_card("b");
        wide.style.span = 2;
        wide.style.background = Some("#FAFAFA".to_string());
        assert_eq!(validate_layout(&layout(vec![text_card("a"), wide])), Ok(()));
    }

    #[test]
    fn reports_every_problem() {
        let mut bad_span = text_card("a");
        bad_span.style.span = 3;
        let mut bad_color = text_card("a");
        bad_color.style.accent = Some("red".to_string());
        let mut empty_image = text_card("c");
        empty_image.kind = CardKind::Image;

        let errors = validate_layout(&layout(vec![bad_span, bad_color, empty_image])).unwrap_err();
        assert_eq!(errors.len(), 4, "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("span 3")));
        assert!(errors.iter().any(|e| e.contains("duplicate card id 'a'")));
        assert!(errors.iter().any(|e| e.contains("'red' is not a hex color")));
        assert!(errors.iter().any(|e| e.contains("image_url is required")));
    }

    #[test]
    fn rejects_bad_page_and_columns() {
        let mut l = layout(vec![]);
        l.page = "Home Page".to_string();
        l.sections[0].columns = 5;
        let errors = validate_layout(&l).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn style_defaults_from_json() {
        let card: LayoutCard =
            serde_json::from_str(r#"{"id":"x","kind":"label_feed","label_slug":"travel"}"#).unwrap();
        assert_eq!(card.style.span, 1);
        assert_eq!(card.style.variant, CardVariant::Plain);
        assert!(is_hex_color("#abc"));
        assert!(!is_hex_color("#abcd"));
    }
}
