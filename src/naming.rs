//! Index-encoded field identity convention shared with the server-side consumer.

use crate::error::{ErrorCode, FormsetError};
use crate::markup::Element;
use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};

/// Index stand-in used by templates so they can be renumbered like live rows.
pub const INDEX_PLACEHOLDER: &str = "__prefix__";

/// Sentinel stored in a deletion marker once its row is marked.
pub const DELETE_MARKER_ON: &str = "on";

const DELETE_MARKER_SUFFIX: &str = "-DELETE";

pub fn total_forms_name(prefix: &str) -> String {
    format!("{prefix}-TOTAL_FORMS")
}

pub fn max_num_forms_name(prefix: &str) -> String {
    format!("{prefix}-MAX_NUM_FORMS")
}

pub fn min_num_forms_name(prefix: &str) -> String {
    format!("{prefix}-MIN_NUM_FORMS")
}

pub fn field_name(prefix: &str, index: &str, field: &str) -> String {
    format!("{prefix}-{index}-{field}")
}

pub fn field_id(name: &str) -> String {
    format!("id_{name}")
}

pub fn delete_marker_name(prefix: &str, index: &str) -> String {
    format!("{prefix}-{index}{DELETE_MARKER_SUFFIX}")
}

pub fn is_delete_marker_name(name: &str) -> bool {
    name.ends_with(DELETE_MARKER_SUFFIX)
}

/// Compiled form of the `<prefix>-<index>-` identity segment. The same
/// pattern matches live rows (numeric index) and templates (placeholder), so
/// both renumber through one code path.
#[derive(Debug, Clone)]
pub struct IndexPattern {
    prefix: String,
    regex: Regex,
}

impl IndexPattern {
    pub fn new(prefix: &str) -> Result<Self, FormsetError> {
        let pattern = format!("{}-(?:[0-9]+|{})-", regex::escape(prefix), INDEX_PLACEHOLDER);
        let regex = Regex::new(&pattern).map_err(|e| FormsetError {
            code: ErrorCode::Internal,
            message: format!("Could not compile index pattern for prefix '{prefix}': {e}"),
        })?;
        Ok(Self {
            prefix: prefix.to_string(),
            regex,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }

    /// Replaces the index segment of one identity value, leaving everything
    /// else untouched. Values without the segment come back unchanged.
    pub fn rewrite(&self, value: &str, index: &str) -> String {
        let replacement = format!("{}-{}-", self.prefix, index);
        self.regex
            .replace(value, NoExpand(replacement.as_str()))
            .into_owned()
    }

    /// Rewrites the positional identity attributes (`for`, `id`, `name`) of a
    /// single element in place. Elements with no matching identity are left
    /// alone.
    pub fn rewrite_identity(&self, elem: &mut Element, index: &str) {
        for key in ["for", "id", "name"] {
            if let Some(value) = elem.attr(key) {
                let updated = self.rewrite(value, index);
                elem.set_attr(key, &updated);
            }
        }
    }

    /// The field-name segment after the index, e.g. `name` for `item-0-name`.
    pub fn field_suffix<'a>(&self, name: &'a str) -> Option<&'a str> {
        self.regex.find(name).map(|m| &name[m.end()..])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManagementField {
    TotalForms,
    MinNumForms,
    MaxNumForms,
}

pub fn classify_management_field(prefix: &str, name: &str) -> Option<ManagementField> {
    if name == total_forms_name(prefix) {
        Some(ManagementField::TotalForms)
    } else if name == min_num_forms_name(prefix) {
        Some(ManagementField::MinNumForms)
    } else if name == max_num_forms_name(prefix) {
        Some(ManagementField::MaxNumForms)
    } else {
        None
    }
}
