use crate::error::{ErrorCode, FormsetError};
use crate::markup::{ControlKind, Element};
use crate::naming::{self, IndexPattern, ManagementField};
use crate::options::{DeleteContext, FormsetHooks, FormsetOptions, HookVerdict, SoftDeletePolicy};
use crate::row::{ContainerKind, Row, matches_css_classes};
use crate::row_template::Template;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

pub type OpId = String;
pub type RunId = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Operation {
    /// Append one row cloned from the template.
    Add,
    /// Remove or mark the row at the given document position.
    Delete { row: usize },
    /// Perform a mutation previously deferred by a hook.
    Resume { ticket: String },
    /// Adjust the min/max bounds and re-evaluate affordance visibility.
    SetBounds {
        min: Option<usize>,
        max: Option<usize>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub run_id: RunId,
    pub ops: Vec<Operation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpResult {
    pub op_id: OpId,
    /// False when the mutation was vetoed, deferred, or a tolerated no-op.
    pub performed: bool,
    pub row_index: Option<usize>,
    /// Ticket handle when the operation was deferred by a hook.
    pub ticket: Option<String>,
    pub total_forms: usize,
    pub warnings: Vec<String>,
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    pub run_id: RunId,
    pub op: Operation,
    pub result: OpResult,
}

/// A deferred mutation parked by a `Defer` hook verdict. The row set stays
/// unmutated until the ticket is redeemed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingOp {
    pub ticket: String,
    pub op: Operation,
}

/// The shared counters, owned here exclusively and mirrored into the hidden
/// management inputs after every mutation. `None` bounds mean unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowSetState {
    pub total: usize,
    pub min: Option<usize>,
    pub max: Option<usize>,
}

impl RowSetState {
    pub fn can_add(&self) -> bool {
        self.max.is_none_or(|max| self.total < max)
    }

    pub fn can_delete(&self) -> bool {
        self.min.is_none_or(|min| self.total > min)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagementFields {
    pub total: Element,
    pub min: Option<Element>,
    pub max: Option<Element>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormsetState {
    pub options: FormsetOptions,
    /// Container shell; non-row, non-management children stay here.
    pub container: Element,
    pub kind: ContainerKind,
    pub rows: Vec<Row>,
    pub template: Template,
    pub management: ManagementFields,
    pub counts: RowSetState,
    pub add_control: Element,
    #[serde(default)]
    pub journal: Vec<OperationRecord>,
    #[serde(default)]
    pub pending: Vec<PendingOp>,
    #[serde(default)]
    pub op_counter: u64,
    #[serde(default)]
    pub ticket_counter: u64,
}

impl FormsetState {
    pub fn load_from_path(path: &str) -> Result<Self, FormsetError> {
        let text = std::fs::read_to_string(path).map_err(|e| FormsetError {
            code: ErrorCode::Io,
            message: format!("Could not read state file '{path}': {e}"),
        })?;
        serde_json::from_str(&text).map_err(|e| FormsetError {
            code: ErrorCode::InvalidInput,
            message: format!("Could not parse state JSON '{path}': {e}"),
        })
    }

    pub fn save_to_path(&self, path: &str) -> Result<(), FormsetError> {
        let text = serde_json::to_string_pretty(self).map_err(|e| FormsetError {
            code: ErrorCode::Internal,
            message: format!("Could not serialize state: {e}"),
        })?;
        std::fs::write(path, text).map_err(|e| FormsetError {
            code: ErrorCode::Io,
            message: format!("Could not write state file '{path}': {e}"),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capabilities {
    pub protocol_version: String,
    pub supported_operations: Vec<String>,
    pub supported_container_kinds: Vec<String>,
    pub deterministic_operation_log: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowSummary {
    pub index: usize,
    pub visible: bool,
    pub soft_deleted: bool,
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormsetSummary {
    pub prefix: String,
    pub kind: ContainerKind,
    pub total_forms: usize,
    pub min_forms: Option<usize>,
    pub max_forms: Option<usize>,
    pub add_visible: bool,
    pub pending_ops: usize,
    pub rows: Vec<RowSummary>,
}

pub trait FormEngine {
    fn apply(&mut self, op: Operation) -> Result<OpResult, FormsetError>;
    fn apply_workflow(&mut self, wf: Workflow) -> Result<Vec<OpResult>, FormsetError>;
    fn state(&self) -> &FormsetState;
}

#[derive(Debug)]
pub struct Formset {
    state: FormsetState,
    hooks: FormsetHooks,
    pattern: IndexPattern,
}

impl Formset {
    pub fn new(container: Element, options: FormsetOptions) -> Result<Self, FormsetError> {
        Self::with_hooks(container, options, FormsetHooks::default())
    }

    pub fn with_hooks(
        mut container: Element,
        mut options: FormsetOptions,
        hooks: FormsetHooks,
    ) -> Result<Self, FormsetError> {
        let pattern = IndexPattern::new(&options.prefix)?;

        let mut row_elems: Vec<Element> = Vec::new();
        let mut total_input: Option<Element> = None;
        let mut min_input: Option<Element> = None;
        let mut max_input: Option<Element> = None;
        let mut rest: Vec<Element> = Vec::new();
        for child in std::mem::take(&mut container.children) {
            let management = if child.is_form_control() {
                child
                    .name()
                    .and_then(|name| naming::classify_management_field(&options.prefix, name))
            } else {
                None
            };
            match management {
                Some(ManagementField::TotalForms) => total_input = Some(child),
                Some(ManagementField::MinNumForms) => min_input = Some(child),
                Some(ManagementField::MaxNumForms) => max_input = Some(child),
                None => {
                    if child.has_child_fields() {
                        row_elems.push(child);
                    } else {
                        rest.push(child);
                    }
                }
            }
        }
        container.children = rest;

        let total_input = total_input.ok_or_else(|| FormsetError {
            code: ErrorCode::InvalidInput,
            message: format!(
                "Missing management field '{}'",
                naming::total_forms_name(&options.prefix)
            ),
        })?;
        let total = total_input
            .value()
            .trim()
            .parse::<usize>()
            .map_err(|e| FormsetError {
                code: ErrorCode::InvalidInput,
                message: format!(
                    "Management field '{}' does not hold a count: {e}",
                    naming::total_forms_name(&options.prefix)
                ),
            })?;
        let counts = RowSetState {
            total,
            min: bound_value(min_input.as_ref()),
            max: bound_value(max_input.as_ref()),
        };

        if row_elems.is_empty() && options.form_template.is_none() {
            return Err(FormsetError {
                code: ErrorCode::InvalidInput,
                message: "Row set has no rows and no explicit template to derive one from"
                    .to_string(),
            });
        }
        let kind = match row_elems.first() {
            Some(row) => ContainerKind::resolve(&row.tag),
            None => options
                .form_template
                .as_ref()
                .map(|t| ContainerKind::resolve(&t.tag))
                .unwrap_or_default(),
        };
        let column_count = row_elems
            .first()
            .or(options.form_template.as_ref())
            .map(|row| row.children.len())
            .unwrap_or(1);

        let mut rows = Vec::new();
        for (i, mut elem) in row_elems.into_iter().enumerate() {
            elem.add_class(&options.row_css_class);
            let mut row = Row::new(elem, i);
            row.convert_delete_checkbox();
            if row.is_visible() {
                kind.attach_delete_control(&mut row.element, &options);
                apply_style_cycle(&options, &mut row.element, row.index);
            }
            rows.push(row);
        }

        let template = match options.form_template.take() {
            Some(explicit) => Template::from_explicit(explicit, &options, &pattern, kind),
            None => {
                // The guard above means rows is non-empty on this branch.
                let last = rows.last().ok_or_else(|| FormsetError {
                    code: ErrorCode::Internal,
                    message: "Row scan lost the template source row".to_string(),
                })?;
                Template::derive_from_row(&last.element, &options, &pattern)
            }
        };

        let mut add_control = kind.make_add_control(&options, column_count);
        if !counts.can_add() {
            add_control.hide();
        }

        let mut formset = Self {
            state: FormsetState {
                options,
                container,
                kind,
                rows,
                template,
                management: ManagementFields {
                    total: total_input,
                    min: min_input,
                    max: max_input,
                },
                counts,
                add_control,
                journal: Vec::new(),
                pending: Vec::new(),
                op_counter: 0,
                ticket_counter: 0,
            },
            hooks,
            pattern,
        };
        formset.refresh_delete_controls();
        formset.sync_management();
        Ok(formset)
    }

    pub fn from_state(state: FormsetState) -> Result<Self, FormsetError> {
        let pattern = IndexPattern::new(&state.options.prefix)?;
        Ok(Self {
            state,
            hooks: FormsetHooks::default(),
            pattern,
        })
    }

    pub fn state_mut(&mut self) -> &mut FormsetState {
        &mut self.state
    }

    pub fn hooks_mut(&mut self) -> &mut FormsetHooks {
        &mut self.hooks
    }

    pub fn capabilities() -> Capabilities {
        Capabilities {
            protocol_version: "v1".to_string(),
            supported_operations: vec![
                "Add".to_string(),
                "Delete".to_string(),
                "Resume".to_string(),
                "SetBounds".to_string(),
            ],
            supported_container_kinds: vec![
                "Table".to_string(),
                "List".to_string(),
                "Generic".to_string(),
            ],
            deterministic_operation_log: true,
        }
    }

    pub fn operation_log(&self) -> &[OperationRecord] {
        &self.state.journal
    }

    pub fn add(&mut self) -> Result<OpResult, FormsetError> {
        self.apply(Operation::Add)
    }

    pub fn delete_row(&mut self, row: usize) -> Result<OpResult, FormsetError> {
        self.apply(Operation::Delete { row })
    }

    pub fn resume(&mut self, ticket: &str) -> Result<OpResult, FormsetError> {
        self.apply(Operation::Resume {
            ticket: ticket.to_string(),
        })
    }

    pub fn summarize_state(&self) -> FormsetSummary {
        FormsetSummary {
            prefix: self.state.options.prefix.clone(),
            kind: self.state.kind,
            total_forms: self.state.counts.total,
            min_forms: self.state.counts.min,
            max_forms: self.state.counts.max,
            add_visible: self.state.add_control.is_visible(),
            pending_ops: self.state.pending.len(),
            rows: self
                .state
                .rows
                .iter()
                .map(|row| RowSummary {
                    index: row.index,
                    visible: row.is_visible(),
                    soft_deleted: row.soft_deleted,
                    names: row.field_names(),
                })
                .collect(),
        }
    }

    /// Rebuilds the full container tree in render order: management fields,
    /// retained shell children, rows, then the add affordance.
    pub fn render_document(&self) -> Element {
        let mut doc = self.state.container.clone();
        let mut children = Vec::new();
        children.push(self.state.management.total.clone());
        if let Some(min) = &self.state.management.min {
            children.push(min.clone());
        }
        if let Some(max) = &self.state.management.max {
            children.push(max.clone());
        }
        children.append(&mut doc.children);
        children.extend(self.state.rows.iter().map(|row| row.element.clone()));
        children.push(self.state.add_control.clone());
        doc.children = children;
        doc
    }

    /// The name/value pairs a form submission would carry, management fields
    /// first. Unchecked checkable fields are skipped, checked ones submit
    /// their value or the "on" sentinel.
    pub fn wire_payload(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for field in [
            Some(&self.state.management.total),
            self.state.management.min.as_ref(),
            self.state.management.max.as_ref(),
        ]
        .into_iter()
        .flatten()
        {
            if let Some(name) = field.name() {
                out.push((name.to_string(), field.value()));
            }
        }
        for row in &self.state.rows {
            row.element.visit(&mut |e| {
                if !e.is_form_control() {
                    return;
                }
                let Some(name) = e.name() else { return };
                match e.control_kind() {
                    ControlKind::Checkbox | ControlKind::Radio => {
                        if e.checked {
                            let value = e.value();
                            let value = if value.is_empty() {
                                naming::DELETE_MARKER_ON.to_string()
                            } else {
                                value
                            };
                            out.push((name.to_string(), value));
                        }
                    }
                    _ => out.push((name.to_string(), e.value())),
                }
            });
        }
        out
    }

    fn apply_internal(&mut self, op: Operation, run_id: &str) -> Result<OpResult, FormsetError> {
        let op_id = self.next_op_id();
        let result = match &op {
            Operation::Add => self.dispatch_add(op_id),
            Operation::Delete { row } => self.dispatch_delete(op_id, *row)?,
            Operation::Resume { ticket } => self.dispatch_resume(op_id, ticket)?,
            Operation::SetBounds { min, max } => self.perform_set_bounds(op_id, *min, *max),
        };
        self.state.journal.push(OperationRecord {
            run_id: run_id.to_string(),
            op,
            result: result.clone(),
        });
        Ok(result)
    }

    fn dispatch_add(&mut self, op_id: OpId) -> OpResult {
        match self.run_before_add() {
            HookVerdict::Proceed => self.perform_add(op_id),
            HookVerdict::Veto => OpResult {
                op_id,
                performed: false,
                row_index: None,
                ticket: None,
                total_forms: self.state.counts.total,
                warnings: Vec::new(),
                messages: vec!["add vetoed by before-add hook".to_string()],
            },
            HookVerdict::Defer => {
                let ticket = self.next_ticket();
                self.state.pending.push(PendingOp {
                    ticket: ticket.clone(),
                    op: Operation::Add,
                });
                OpResult {
                    op_id,
                    performed: false,
                    row_index: None,
                    ticket: Some(ticket.clone()),
                    total_forms: self.state.counts.total,
                    warnings: Vec::new(),
                    messages: vec![format!("add deferred as {ticket}")],
                }
            }
        }
    }

    fn dispatch_delete(&mut self, op_id: OpId, pos: usize) -> Result<OpResult, FormsetError> {
        if pos >= self.state.rows.len() {
            return Err(FormsetError {
                code: ErrorCode::NotFound,
                message: format!(
                    "No row at position {pos} ({} attached)",
                    self.state.rows.len()
                ),
            });
        }
        match self.run_before_delete(pos) {
            HookVerdict::Proceed => Ok(self.perform_delete(op_id, pos)),
            HookVerdict::Veto => Ok(OpResult {
                op_id,
                performed: false,
                row_index: Some(self.state.rows[pos].index),
                ticket: None,
                total_forms: self.state.counts.total,
                warnings: Vec::new(),
                messages: vec!["delete vetoed by before-delete hook".to_string()],
            }),
            HookVerdict::Defer => {
                let ticket = self.next_ticket();
                self.state.pending.push(PendingOp {
                    ticket: ticket.clone(),
                    op: Operation::Delete { row: pos },
                });
                Ok(OpResult {
                    op_id,
                    performed: false,
                    row_index: Some(self.state.rows[pos].index),
                    ticket: Some(ticket.clone()),
                    total_forms: self.state.counts.total,
                    warnings: Vec::new(),
                    messages: vec![format!("delete deferred as {ticket}")],
                })
            }
        }
    }

    fn dispatch_resume(&mut self, op_id: OpId, ticket: &str) -> Result<OpResult, FormsetError> {
        let position = self
            .state
            .pending
            .iter()
            .position(|p| p.ticket == ticket)
            .ok_or_else(|| FormsetError {
                code: ErrorCode::NotFound,
                message: format!("No pending operation for ticket '{ticket}'"),
            })?;
        let pending = self.state.pending.remove(position);
        match pending.op {
            Operation::Add => Ok(self.perform_add(op_id)),
            Operation::Delete { row } => {
                if row >= self.state.rows.len() {
                    return Err(FormsetError {
                        code: ErrorCode::NotFound,
                        message: format!(
                            "Deferred delete targets position {row}, but only {} rows remain",
                            self.state.rows.len()
                        ),
                    });
                }
                Ok(self.perform_delete(op_id, row))
            }
            other => Err(FormsetError {
                code: ErrorCode::Internal,
                message: format!("Ticket '{ticket}' holds a non-deferrable operation: {other:?}"),
            }),
        }
    }

    fn perform_add(&mut self, op_id: OpId) -> OpResult {
        let index = self.state.counts.total;
        let mut element = self.state.template.instantiate();
        let token = index.to_string();
        element.visit_mut(&mut |e| self.pattern.rewrite_identity(e, &token));
        apply_style_cycle(&self.state.options, &mut element, index);

        let mut row = Row::new(element, index);
        if !row.convert_delete_checkbox() {
            row.has_delete_marker = row.delete_marker().is_some();
        }
        // Insertion point is immediately before the add affordance.
        self.state.rows.push(row);
        self.state.counts.total += 1;

        self.refresh_delete_controls();
        self.refresh_add_control();
        self.sync_management();

        if let Some(hook) = self.hooks.added.as_mut() {
            if let Some(row) = self.state.rows.last() {
                hook(&row.element);
            }
        }
        OpResult {
            op_id,
            performed: true,
            row_index: Some(index),
            ticket: None,
            total_forms: self.state.counts.total,
            warnings: Vec::new(),
            messages: vec![format!("added row {index}")],
        }
    }

    fn perform_delete(&mut self, op_id: OpId, pos: usize) -> OpResult {
        let mut warnings = Vec::new();
        let mut messages = Vec::new();
        let mut removed_element: Option<Element> = None;
        let mut performed = true;
        let row_index;

        if self.state.rows[pos].has_delete_marker {
            let row = &mut self.state.rows[pos];
            row_index = row.index;
            if row.soft_deleted {
                warnings.push(format!("row {row_index} is already marked for deletion"));
                performed = false;
            } else {
                match row.delete_marker_mut() {
                    Some(marker) => marker.set_value(naming::DELETE_MARKER_ON),
                    None => warnings.push(format!(
                        "row {row_index} has no deletion marker field to set"
                    )),
                }
                row.element.hide();
                row.soft_deleted = true;
                removed_element = Some(row.element.clone());
                if self.state.options.soft_delete_policy == SoftDeletePolicy::DecrementTotal {
                    self.state.counts.total = self.state.counts.total.saturating_sub(1);
                }
                messages.push(format!("marked row {row_index} for deletion"));
            }
        } else {
            let row = self.state.rows.remove(pos);
            row_index = row.index;
            removed_element = Some(row.element);
            self.state.counts.total = self.state.rows.len();
            self.renumber_rows();
            messages.push(format!(
                "removed row {row_index}, remaining indices [{}]",
                self.state
                    .rows
                    .iter()
                    .filter(|r| !r.soft_deleted)
                    .map(|r| r.index)
                    .join(", ")
            ));
        }

        if performed {
            self.refresh_delete_controls();
            self.refresh_add_control();
            self.sync_management();
            if let Some(hook) = self.hooks.removed.as_mut() {
                if let Some(element) = &removed_element {
                    hook(element);
                }
            }
        }
        OpResult {
            op_id,
            performed,
            row_index: Some(row_index),
            ticket: None,
            total_forms: self.state.counts.total,
            warnings,
            messages,
        }
    }

    fn perform_set_bounds(
        &mut self,
        op_id: OpId,
        min: Option<usize>,
        max: Option<usize>,
    ) -> OpResult {
        self.state.counts.min = min;
        self.state.counts.max = max;
        self.refresh_delete_controls();
        self.refresh_add_control();
        self.sync_management();
        OpResult {
            op_id,
            performed: true,
            row_index: None,
            ticket: None,
            total_forms: self.state.counts.total,
            warnings: Vec::new(),
            messages: vec![format!("bounds set to min={min:?}, max={max:?}")],
        }
    }

    /// Reassigns dense indices to the non-soft-deleted rows in document
    /// order; soft-deleted rows keep the index their marker was submitted
    /// under.
    fn renumber_rows(&mut self) {
        let mut next = 0usize;
        for row in &mut self.state.rows {
            if row.soft_deleted {
                continue;
            }
            row.index = next;
            let token = next.to_string();
            row.element
                .visit_mut(&mut |e| self.pattern.rewrite_identity(e, &token));
            apply_style_cycle(&self.state.options, &mut row.element, next);
            next += 1;
        }
    }

    fn refresh_delete_controls(&mut self) {
        let show = self.state.counts.can_delete();
        for row in &mut self.state.rows {
            if row.soft_deleted {
                continue;
            }
            row.element.visit_mut(&mut |e| {
                if matches_css_classes(e, &self.state.options.delete_css_class) {
                    e.hidden = !show;
                }
            });
        }
        if self.state.options.keep_first {
            let visible_rows = self
                .state
                .rows
                .iter()
                .filter(|r| !r.soft_deleted)
                .count();
            if let Some(first) = self.state.rows.iter_mut().find(|r| !r.soft_deleted) {
                first.element.visit_mut(&mut |e| {
                    if matches_css_classes(e, &self.state.options.delete_css_class) {
                        if visible_rows == 1 {
                            e.set_attr("disabled", "disabled");
                        } else {
                            e.remove_attr("disabled");
                        }
                    }
                });
            }
        }
    }

    fn refresh_add_control(&mut self) {
        self.state.add_control.hidden = !self.state.counts.can_add();
    }

    fn sync_management(&mut self) {
        self.state
            .management
            .total
            .set_value(&self.state.counts.total.to_string());
        if let Some(min) = self.state.management.min.as_mut() {
            min.set_value(&bound_text(self.state.counts.min));
        }
        if let Some(max) = self.state.management.max.as_mut() {
            max.set_value(&bound_text(self.state.counts.max));
        }
    }

    fn run_before_add(&mut self) -> HookVerdict {
        match self.hooks.before_add.as_mut() {
            Some(hook) => hook(),
            None => HookVerdict::Proceed,
        }
    }

    fn run_before_delete(&mut self, pos: usize) -> HookVerdict {
        let Some(hook) = self.hooks.before_delete.as_mut() else {
            return HookVerdict::Proceed;
        };
        let visible_rows = self
            .state
            .rows
            .iter()
            .filter(|r| !r.soft_deleted)
            .count();
        let row = &self.state.rows[pos];
        hook(DeleteContext {
            row: &row.element,
            marker: row.delete_marker(),
            visible_rows,
        })
    }

    fn next_op_id(&mut self) -> OpId {
        self.state.op_counter += 1;
        format!("op-{}", self.state.op_counter)
    }

    fn next_ticket(&mut self) -> String {
        self.state.ticket_counter += 1;
        format!("ticket-{}", self.state.ticket_counter)
    }
}

impl FormEngine for Formset {
    fn apply(&mut self, op: Operation) -> Result<OpResult, FormsetError> {
        self.apply_internal(op, "adhoc")
    }

    fn apply_workflow(&mut self, wf: Workflow) -> Result<Vec<OpResult>, FormsetError> {
        let mut results = Vec::new();
        for op in wf.ops {
            results.push(self.apply_internal(op, &wf.run_id)?);
        }
        Ok(results)
    }

    fn state(&self) -> &FormsetState {
        &self.state
    }
}

fn bound_value(input: Option<&Element>) -> Option<usize> {
    input.and_then(|e| e.value().trim().parse::<usize>().ok())
}

fn bound_text(bound: Option<usize>) -> String {
    bound.map(|b| b.to_string()).unwrap_or_default()
}

fn apply_style_cycle(options: &FormsetOptions, element: &mut Element, index: usize) {
    if options.extra_classes.is_empty() {
        return;
    }
    for class in &options.extra_classes {
        element.remove_class(class);
    }
    element.add_class(&options.extra_classes[index % options.extra_classes.len()]);
}
