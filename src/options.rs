use crate::markup::Element;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What happens to `TOTAL_FORMS` when a row is soft-deleted. The server-side
/// consumer normally still processes marked rows, so the count keeps them by
/// default; `DecrementTotal` counts them out for consumers that drop marked
/// rows before reprocessing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoftDeletePolicy {
    #[default]
    KeepTotal,
    DecrementTotal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormsetOptions {
    /// Namespace shared by every field name in the row set.
    pub prefix: String,
    pub add_text: String,
    pub delete_text: String,
    pub add_css_class: String,
    pub delete_css_class: String,
    /// Class marking a structural row.
    pub row_css_class: String,
    /// Style cycle applied to rows by index modulo list length.
    pub extra_classes: Vec<String>,
    /// Bare field names (the segment after the index) whose values survive
    /// template derivation.
    pub keep_field_values: Vec<String>,
    /// Disable the first row's delete control while it is the only visible row.
    pub keep_first: bool,
    /// Class of validation-error containers stripped from derived templates.
    pub error_css_class: String,
    /// Class of field-group containers that carry error classes to strip.
    pub field_group_css_class: String,
    pub soft_delete_policy: SoftDeletePolicy,
    /// Explicit row template; when absent one is derived from the last row.
    pub form_template: Option<Element>,
}

impl Default for FormsetOptions {
    fn default() -> Self {
        Self {
            prefix: "form".to_string(),
            add_text: "add another".to_string(),
            delete_text: "remove".to_string(),
            add_css_class: "add-row".to_string(),
            delete_css_class: "delete-row".to_string(),
            row_css_class: "dynamic-form".to_string(),
            extra_classes: Vec::new(),
            keep_field_values: Vec::new(),
            keep_first: false,
            error_css_class: "errorlist".to_string(),
            field_group_css_class: String::new(),
            soft_delete_policy: SoftDeletePolicy::default(),
            form_template: None,
        }
    }
}

impl FormsetOptions {
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            ..Self::default()
        }
    }
}

/// Verdict of a pre-mutation hook. `Defer` parks the whole mutation behind a
/// ticket; a hook that decides synchronously answers Proceed or Veto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookVerdict {
    Proceed,
    Veto,
    Defer,
}

/// What a `before_delete` hook gets to look at before the mutation happens.
pub struct DeleteContext<'a> {
    pub row: &'a Element,
    pub marker: Option<&'a Element>,
    pub visible_rows: usize,
}

pub type BeforeAddHook = Box<dyn FnMut() -> HookVerdict>;
pub type BeforeDeleteHook = Box<dyn FnMut(DeleteContext<'_>) -> HookVerdict>;
pub type RowNotifyHook = Box<dyn FnMut(&Element)>;

#[derive(Default)]
pub struct FormsetHooks {
    pub before_add: Option<BeforeAddHook>,
    pub before_delete: Option<BeforeDeleteHook>,
    pub added: Option<RowNotifyHook>,
    pub removed: Option<RowNotifyHook>,
}

impl fmt::Debug for FormsetHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormsetHooks")
            .field("before_add", &self.before_add.is_some())
            .field("before_delete", &self.before_delete.is_some())
            .field("added", &self.added.is_some())
            .field("removed", &self.removed.is_some())
            .finish()
    }
}
