//! Pristine-row production for the add operation.

use crate::markup::{ControlKind, Element};
use crate::naming::{INDEX_PLACEHOLDER, IndexPattern};
use crate::options::FormsetOptions;
use crate::row::{ContainerKind, is_delete_marker_field, matches_css_classes};
use serde::{Deserialize, Serialize};

/// Class distinguishing the template from live rows, so structural scans can
/// exclude it.
pub const TEMPLATE_MARKER_CLASS: &str = "formset-custom-template";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    element: Element,
}

impl Template {
    /// Prepares an explicitly configured template: renumbered once to the
    /// placeholder index, given a delete control, and reused for every add.
    pub fn from_explicit(
        mut element: Element,
        options: &FormsetOptions,
        pattern: &IndexPattern,
        kind: ContainerKind,
    ) -> Self {
        element.remove_attr("id");
        element.add_class(&options.row_css_class);
        element.add_class(TEMPLATE_MARKER_CLASS);
        element.visit_mut(&mut |e| pattern.rewrite_identity(e, INDEX_PLACEHOLDER));
        kind.attach_delete_control(&mut element, options);
        Self { element }
    }

    /// Derives a template by cloning an existing row and restoring it to a
    /// pristine state: no document identity, no deletion marker, no
    /// validation artifacts, all fields cleared except the configured
    /// keep-list.
    pub fn derive_from_row(
        source: &Element,
        options: &FormsetOptions,
        pattern: &IndexPattern,
    ) -> Self {
        let mut element = source.clone();
        element.remove_attr("id");
        element.show();
        element.remove_descendants(|e| is_delete_marker_field(e));
        if !options.error_css_class.is_empty() {
            element.remove_descendants(|e| matches_css_classes(e, &options.error_css_class));
            if !options.field_group_css_class.is_empty() {
                element.visit_mut(&mut |e| {
                    if matches_css_classes(e, &options.field_group_css_class) {
                        e.remove_class(&options.error_css_class);
                    }
                });
            }
        }
        clear_fields(&mut element, options, pattern);
        element.add_class(TEMPLATE_MARKER_CLASS);
        Self { element }
    }

    /// A fresh row ready for insertion; the template itself is never shared.
    pub fn instantiate(&self) -> Element {
        let mut element = self.element.clone();
        element.remove_class(TEMPLATE_MARKER_CLASS);
        element.show();
        element
    }

    pub fn element(&self) -> &Element {
        &self.element
    }

    pub fn tag(&self) -> &str {
        &self.element.tag
    }
}

fn clear_fields(element: &mut Element, options: &FormsetOptions, pattern: &IndexPattern) {
    element.visit_mut(&mut |e| {
        if !e.is_form_control() {
            return;
        }
        if let Some(name) = e.name() {
            let suffix = pattern.field_suffix(name).unwrap_or(name);
            if options.keep_field_values.iter().any(|k| k == suffix) {
                return;
            }
        }
        match e.control_kind() {
            ControlKind::Checkbox | ControlKind::Radio => e.checked = false,
            _ => e.set_value(""),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern() -> IndexPattern {
        IndexPattern::new("item").unwrap()
    }

    fn populated_row() -> Element {
        let mut checkbox = Element::new("input")
            .with_attr("type", "checkbox")
            .with_attr("name", "item-1-active");
        checkbox.checked = true;
        Element::new("div")
            .with_attr("id", "row-1")
            .with_child(Element::new("ul").with_class("errorlist"))
            .with_child(
                Element::new("input")
                    .with_attr("type", "text")
                    .with_attr("name", "item-1-name")
                    .with_attr("value", "x"),
            )
            .with_child(
                Element::new("input")
                    .with_attr("type", "text")
                    .with_attr("name", "item-1-qty")
                    .with_attr("value", "2"),
            )
            .with_child(checkbox)
            .with_child(
                Element::new("input")
                    .with_attr("type", "hidden")
                    .with_attr("name", "item-1-DELETE")
                    .with_attr("id", "id_item-1-DELETE"),
            )
    }

    #[test]
    fn test_derived_template_is_pristine() {
        let options = FormsetOptions::with_prefix("item");
        let template = Template::derive_from_row(&populated_row(), &options, &pattern());
        let e = template.element();
        assert!(e.has_class(TEMPLATE_MARKER_CLASS));
        assert_eq!(e.attr("id"), None);
        assert_eq!(e.count(|c| c.has_class("errorlist")), 0);
        assert_eq!(e.count(is_delete_marker_field), 0);
        let name_field = e
            .find_first(|c| c.name() == Some("item-1-name"))
            .unwrap();
        assert_eq!(name_field.value(), "");
        let checkbox = e
            .find_first(|c| c.name() == Some("item-1-active"))
            .unwrap();
        assert!(!checkbox.checked);
    }

    #[test]
    fn test_keep_field_values_survive_clearing() {
        let mut options = FormsetOptions::with_prefix("item");
        options.keep_field_values = vec!["qty".to_string()];
        let template = Template::derive_from_row(&populated_row(), &options, &pattern());
        let qty = template
            .element()
            .find_first(|c| c.name() == Some("item-1-qty"))
            .unwrap();
        assert_eq!(qty.value(), "2");
        let name = template
            .element()
            .find_first(|c| c.name() == Some("item-1-name"))
            .unwrap();
        assert_eq!(name.value(), "");
    }

    #[test]
    fn test_field_group_error_class_is_stripped() {
        let mut options = FormsetOptions::with_prefix("item");
        options.field_group_css_class = "field-group".to_string();
        let mut group = Element::new("div");
        group.add_class("field-group errorlist");
        let source = Element::new("div").with_child(group).with_child(
            Element::new("input").with_attr("name", "item-0-name"),
        );
        let template = Template::derive_from_row(&source, &options, &pattern());
        let group = template
            .element()
            .find_first(|e| e.has_class("field-group"))
            .unwrap();
        assert!(!group.has_class("errorlist"));
    }

    #[test]
    fn test_explicit_template_renumbers_to_placeholder() {
        let options = FormsetOptions::with_prefix("item");
        let explicit = Element::new("tr")
            .with_attr("id", "empty-form")
            .with_child(
                Element::new("td").with_child(
                    Element::new("input")
                        .with_attr("name", "item-0-name")
                        .with_attr("id", "id_item-0-name"),
                ),
            );
        let template =
            Template::from_explicit(explicit, &options, &pattern(), ContainerKind::Table);
        let e = template.element();
        assert_eq!(e.attr("id"), None);
        assert!(e.has_class("dynamic-form"));
        assert!(e.has_class(TEMPLATE_MARKER_CLASS));
        let field = e.find_first(|c| c.tag == "input").unwrap();
        assert_eq!(field.name(), Some("item-__prefix__-name"));
        assert_eq!(field.id(), Some("id_item-__prefix__-name"));
        // The delete control landed in the last cell, table style.
        let anchor = e
            .find_first(|c| c.has_class("delete-row"))
            .unwrap();
        assert_eq!(anchor.tag, "a");
    }

    #[test]
    fn test_instantiate_produces_untagged_visible_row() {
        let options = FormsetOptions::with_prefix("item");
        let mut source = populated_row();
        source.hide();
        let template = Template::derive_from_row(&source, &options, &pattern());
        let fresh = template.instantiate();
        assert!(!fresh.has_class(TEMPLATE_MARKER_CLASS));
        assert!(fresh.is_visible());
        // Instantiating twice yields independent clones.
        let again = template.instantiate();
        assert_eq!(fresh, again);
    }
}
