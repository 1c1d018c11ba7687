//! Row bookkeeping around one markup subtree, plus container-shape strategies.

use crate::markup::{ControlKind, Element};
use crate::naming;
use crate::options::FormsetOptions;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Row {
    pub element: Element,
    /// Positional index currently encoded in this row's field identities.
    pub index: usize,
    #[serde(default)]
    pub soft_deleted: bool,
    /// Fixed at initialization: whether this row belongs to the soft-delete
    /// group. Such a row is hidden and marked instead of detached.
    #[serde(default)]
    pub has_delete_marker: bool,
}

impl Row {
    pub fn new(element: Element, index: usize) -> Self {
        Self {
            element,
            index,
            soft_deleted: false,
            has_delete_marker: false,
        }
    }

    /// Replaces a `-DELETE` checkbox with an equivalent hidden field (checked
    /// becomes the "on" sentinel), hides its label, and hides the row when it
    /// arrived pre-checked. Returns whether a marker was found.
    pub fn convert_delete_checkbox(&mut self) -> bool {
        let Some(converted) = convert_checkbox(&mut self.element) else {
            return false;
        };
        if let Some(marker_id) = converted.marker_id {
            self.element.visit_mut(&mut |e| {
                if e.tag == "label" && e.for_target() == Some(marker_id.as_str()) {
                    e.hide();
                }
            });
        }
        if converted.was_checked {
            self.element.hide();
            self.soft_deleted = true;
        }
        self.has_delete_marker = true;
        true
    }

    pub fn delete_marker(&self) -> Option<&Element> {
        self.element.find_first(|e| is_delete_marker_field(e))
    }

    pub fn delete_marker_mut(&mut self) -> Option<&mut Element> {
        self.element.find_first_mut(|e| is_delete_marker_field(e))
    }

    /// Names of every named form control inside the row, document order.
    pub fn field_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.element.visit(&mut |e| {
            if e.is_form_control() {
                if let Some(name) = e.name() {
                    names.push(name.to_string());
                }
            }
        });
        names
    }

    pub fn is_visible(&self) -> bool {
        self.element.is_visible()
    }
}

struct ConvertedMarker {
    marker_id: Option<String>,
    was_checked: bool,
}

fn convert_checkbox(elem: &mut Element) -> Option<ConvertedMarker> {
    for child in &mut elem.children {
        if child.control_kind() == ControlKind::Checkbox && is_delete_marker_field(child) {
            let was_checked = child.checked;
            let mut hidden = Element::new("input").with_attr("type", "hidden");
            if let Some(name) = child.name() {
                hidden.set_attr("name", name);
            }
            let marker_id = child.id().map(|s| s.to_string());
            if let Some(id) = &marker_id {
                hidden.set_attr("id", id);
            }
            hidden.set_value(if was_checked {
                naming::DELETE_MARKER_ON
            } else {
                ""
            });
            *child = hidden;
            return Some(ConvertedMarker {
                marker_id,
                was_checked,
            });
        }
        if let Some(found) = convert_checkbox(child) {
            return Some(found);
        }
    }
    None
}

pub fn is_delete_marker_field(e: &Element) -> bool {
    if !matches!(
        e.control_kind(),
        ControlKind::Checkbox | ControlKind::Hidden
    ) {
        return false;
    }
    e.id().is_some_and(naming::is_delete_marker_name)
        || e.name().is_some_and(naming::is_delete_marker_name)
}

/// True when the element carries every class of a whitespace-separated spec.
pub fn matches_css_classes(e: &Element, spec: &str) -> bool {
    let mut parts = spec.split_whitespace().peekable();
    parts.peek().is_some() && spec.split_whitespace().all(|c| e.has_class(c))
}

/// Container shape, resolved once at construction and dispatched by match for
/// the two placement strategies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerKind {
    Table,
    List,
    #[default]
    Generic,
}

impl ContainerKind {
    pub fn resolve(row_tag: &str) -> Self {
        match row_tag {
            "tr" => Self::Table,
            "li" | "ul" | "ol" => Self::List,
            _ => Self::Generic,
        }
    }

    /// Builds the add affordance: a full-width extra table row for tables,
    /// otherwise a block-level anchor placed after the last row.
    pub fn make_add_control(self, options: &FormsetOptions, column_count: usize) -> Element {
        let anchor = anchor(&options.add_css_class, &options.add_text);
        match self {
            Self::Table => {
                let cell = Element::new("td")
                    .with_attr("colspan", &column_count.max(1).to_string())
                    .with_child(anchor);
                Element::new("tr")
                    .with_class(&format!("{}-add", options.row_css_class))
                    .with_child(cell)
            }
            Self::List | Self::Generic => anchor,
        }
    }

    /// Appends the delete affordance to one row: into the last cell for
    /// tables, as an extra list item for lists, inline otherwise.
    pub fn attach_delete_control(self, row: &mut Element, options: &FormsetOptions) {
        let anchor = anchor(&options.delete_css_class, &options.delete_text);
        match self {
            Self::Table => match row.children.last_mut() {
                Some(cell) => cell.children.push(anchor),
                None => row.children.push(Element::new("td").with_child(anchor)),
            },
            Self::List => row.children.push(Element::new("li").with_child(anchor)),
            Self::Generic => row.children.push(anchor),
        }
    }
}

fn anchor(css_class: &str, text: &str) -> Element {
    let mut a = Element::new("a")
        .with_attr("href", "javascript:void(0)")
        .with_text(text);
    a.add_class(css_class);
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker_checkbox(checked: bool) -> Element {
        let mut cb = Element::new("input")
            .with_attr("type", "checkbox")
            .with_attr("name", "item-0-DELETE")
            .with_attr("id", "id_item-0-DELETE");
        cb.checked = checked;
        cb
    }

    fn row_with_marker(checked: bool) -> Row {
        let cell = Element::new("td")
            .with_child(
                Element::new("label")
                    .with_attr("for", "id_item-0-DELETE")
                    .with_text("Delete"),
            )
            .with_child(marker_checkbox(checked));
        Row::new(Element::new("tr").with_child(cell), 0)
    }

    #[test]
    fn test_convert_unchecked_checkbox() {
        let mut row = row_with_marker(false);
        assert!(row.convert_delete_checkbox());
        assert!(row.has_delete_marker);
        assert!(!row.soft_deleted);
        assert!(row.is_visible());
        let marker = row.delete_marker().unwrap();
        assert_eq!(marker.control_kind(), ControlKind::Hidden);
        assert_eq!(marker.name(), Some("item-0-DELETE"));
        assert_eq!(marker.value(), "");
        // The checkbox itself is gone, only the hidden field remains.
        assert_eq!(
            row.element
                .count(|e| e.control_kind() == ControlKind::Checkbox),
            0
        );
    }

    #[test]
    fn test_convert_checked_checkbox_hides_row() {
        let mut row = row_with_marker(true);
        assert!(row.convert_delete_checkbox());
        assert!(row.soft_deleted);
        assert!(!row.is_visible());
        assert_eq!(row.delete_marker().unwrap().value(), "on");
        let label = row
            .element
            .find_first(|e| e.tag == "label")
            .unwrap();
        assert!(label.hidden);
    }

    #[test]
    fn test_rows_without_marker_are_untouched() {
        let mut row = Row::new(
            Element::new("tr").with_child(
                Element::new("td")
                    .with_child(Element::new("input").with_attr("name", "item-0-name")),
            ),
            0,
        );
        assert!(!row.convert_delete_checkbox());
        assert!(!row.has_delete_marker);
        assert!(row.delete_marker().is_none());
    }

    #[test]
    fn test_container_kind_resolution() {
        assert_eq!(ContainerKind::resolve("tr"), ContainerKind::Table);
        assert_eq!(ContainerKind::resolve("li"), ContainerKind::List);
        assert_eq!(ContainerKind::resolve("div"), ContainerKind::Generic);
        assert_eq!(ContainerKind::resolve("fieldset"), ContainerKind::Generic);
    }

    #[test]
    fn test_table_add_control_reads_column_count() {
        let options = FormsetOptions::default();
        let control = ContainerKind::Table.make_add_control(&options, 3);
        assert_eq!(control.tag, "tr");
        assert!(control.has_class("dynamic-form-add"));
        assert_eq!(control.children[0].attr("colspan"), Some("3"));
        let anchor = &control.children[0].children[0];
        assert!(anchor.has_class("add-row"));
        assert_eq!(anchor.text, "add another");
    }

    #[test]
    fn test_delete_control_placement_per_kind() {
        let options = FormsetOptions::default();

        let mut tr = Element::new("tr").with_child(Element::new("td"));
        ContainerKind::Table.attach_delete_control(&mut tr, &options);
        assert!(tr.children[0].children[0].has_class("delete-row"));

        let mut li = Element::new("li").with_child(Element::new("input"));
        ContainerKind::List.attach_delete_control(&mut li, &options);
        let extra = li.children.last().unwrap();
        assert_eq!(extra.tag, "li");
        assert!(extra.children[0].has_class("delete-row"));

        let mut div = Element::new("div");
        ContainerKind::Generic.attach_delete_control(&mut div, &options);
        assert!(div.children[0].has_class("delete-row"));
    }

    #[test]
    fn test_matches_css_classes() {
        let mut e = Element::new("a");
        e.add_class("delete-row btn");
        assert!(matches_css_classes(&e, "delete-row"));
        assert!(matches_css_classes(&e, "delete-row btn"));
        assert!(!matches_css_classes(&e, "delete-row missing"));
        assert!(!matches_css_classes(&e, ""));
    }
}
