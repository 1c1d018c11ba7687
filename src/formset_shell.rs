use crate::formset::{FormEngine, Formset, FormsetState, Operation, Workflow};
use crate::markup::Element;
use crate::options::FormsetOptions;
use serde_json::{Value, json};
use std::fs;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Help,
    Capabilities,
    StateSummary,
    Init {
        document: String,
        options: Option<String>,
    },
    LoadProject { path: String },
    SaveProject { path: String },
    ExportDocument { path: String },
    ExportNames,
    Op { payload: String },
    Workflow { payload: String },
}

#[derive(Debug, Clone)]
pub struct ShellRunResult {
    pub state_changed: bool,
    pub output: Value,
}

impl ShellCommand {
    pub fn preview(&self) -> String {
        match self {
            Self::Help => "show shell command help".to_string(),
            Self::Capabilities => "inspect engine capabilities".to_string(),
            Self::StateSummary => "show row/count state summary".to_string(),
            Self::Init { document, options } => {
                let options = options.as_deref().unwrap_or("defaults");
                format!("initialize row set from markup '{document}' with options {options}")
            }
            Self::LoadProject { path } => format!("load row-set state from '{path}'"),
            Self::SaveProject { path } => format!("save current row-set state to '{path}'"),
            Self::ExportDocument { path } => format!("export rendered markup to '{path}'"),
            Self::ExportNames => "dump the wire field-name table".to_string(),
            Self::Op { .. } => "apply one engine operation from JSON".to_string(),
            Self::Workflow { .. } => "apply engine workflow from JSON".to_string(),
        }
    }

    pub fn is_state_mutating(&self) -> bool {
        matches!(
            self,
            Self::Init { .. } | Self::LoadProject { .. } | Self::Op { .. } | Self::Workflow { .. }
        )
    }
}

pub fn shell_help_text() -> &'static str {
    "Formset shell commands:\n\
help\n\
capabilities\n\
state-summary\n\
init DOCUMENT.xml [OPTIONS.json]\n\
load-project PATH\n\
save-project PATH\n\
export-document OUTPUT.xml\n\
export-names\n\
op <operation-json-or-@file>\n\
workflow <workflow-json-or-@file>"
}

fn parse_json_payload(raw: &str) -> Result<String, String> {
    if let Some(path) = raw.strip_prefix('@') {
        fs::read_to_string(path).map_err(|e| format!("Could not read JSON file '{path}': {e}"))
    } else {
        Ok(raw.to_string())
    }
}

fn token_error(command: &str) -> String {
    format!("Invalid '{command}' usage. Try: help")
}

pub fn parse_shell_tokens(tokens: &[String]) -> Result<ShellCommand, String> {
    if tokens.is_empty() {
        return Err("Missing shell command".to_string());
    }
    let cmd = tokens[0].as_str();
    match cmd {
        "help" | "-h" | "--help" => Ok(ShellCommand::Help),
        "capabilities" => {
            if tokens.len() == 1 {
                Ok(ShellCommand::Capabilities)
            } else {
                Err(token_error(cmd))
            }
        }
        "state-summary" => {
            if tokens.len() == 1 {
                Ok(ShellCommand::StateSummary)
            } else {
                Err(token_error(cmd))
            }
        }
        "init" => match tokens.len() {
            2 => Ok(ShellCommand::Init {
                document: tokens[1].clone(),
                options: None,
            }),
            3 => Ok(ShellCommand::Init {
                document: tokens[1].clone(),
                options: Some(tokens[2].clone()),
            }),
            _ => Err(token_error(cmd)),
        },
        "load-project" | "import-state" => {
            if tokens.len() == 2 {
                Ok(ShellCommand::LoadProject {
                    path: tokens[1].clone(),
                })
            } else {
                Err(token_error(cmd))
            }
        }
        "save-project" | "export-state" => {
            if tokens.len() == 2 {
                Ok(ShellCommand::SaveProject {
                    path: tokens[1].clone(),
                })
            } else {
                Err(token_error(cmd))
            }
        }
        "export-document" => {
            if tokens.len() == 2 {
                Ok(ShellCommand::ExportDocument {
                    path: tokens[1].clone(),
                })
            } else {
                Err(token_error(cmd))
            }
        }
        "export-names" => {
            if tokens.len() == 1 {
                Ok(ShellCommand::ExportNames)
            } else {
                Err(token_error(cmd))
            }
        }
        "op" => {
            let payload = tokens[1..].join(" ");
            if payload.trim().is_empty() {
                return Err("Missing operation JSON".to_string());
            }
            Ok(ShellCommand::Op { payload })
        }
        "workflow" => {
            let payload = tokens[1..].join(" ");
            if payload.trim().is_empty() {
                return Err("Missing workflow JSON".to_string());
            }
            Ok(ShellCommand::Workflow { payload })
        }
        other => Err(format!("Unknown shell command '{other}'. Try: help")),
    }
}

pub fn parse_shell_line(line: &str) -> Result<ShellCommand, String> {
    let tokens = split_shell_words(line)?;
    parse_shell_tokens(&tokens)
}

pub fn split_shell_words(line: &str) -> Result<Vec<String>, String> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mode {
        Normal,
        SingleQuoted,
        DoubleQuoted,
    }

    let mut out = Vec::new();
    let mut current = String::new();
    let mut mode = Mode::Normal;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match mode {
            Mode::Normal => match ch {
                '\'' => mode = Mode::SingleQuoted,
                '"' => mode = Mode::DoubleQuoted,
                '\\' => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                }
                c if c.is_whitespace() => {
                    if !current.is_empty() {
                        out.push(current.clone());
                        current.clear();
                    }
                }
                _ => current.push(ch),
            },
            Mode::SingleQuoted => {
                if ch == '\'' {
                    mode = Mode::Normal;
                } else {
                    current.push(ch);
                }
            }
            Mode::DoubleQuoted => {
                if ch == '"' {
                    mode = Mode::Normal;
                } else if ch == '\\' {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                } else {
                    current.push(ch);
                }
            }
        }
    }

    if mode != Mode::Normal {
        return Err("Unterminated quoted string in shell command".to_string());
    }
    if !current.is_empty() {
        out.push(current);
    }
    if out.is_empty() {
        return Err("Empty shell command".to_string());
    }
    Ok(out)
}

fn loaded<'a>(formset: &'a mut Option<Formset>) -> Result<&'a mut Formset, String> {
    formset
        .as_mut()
        .ok_or_else(|| "No row set loaded; run 'init' or 'load-project' first".to_string())
}

pub fn execute_shell_command(
    formset: &mut Option<Formset>,
    command: &ShellCommand,
) -> Result<ShellRunResult, String> {
    let result = match command {
        ShellCommand::Help => ShellRunResult {
            state_changed: false,
            output: json!({ "help": shell_help_text() }),
        },
        ShellCommand::Capabilities => ShellRunResult {
            state_changed: false,
            output: serde_json::to_value(Formset::capabilities())
                .map_err(|e| format!("Could not serialize capabilities: {e}"))?,
        },
        ShellCommand::StateSummary => {
            let engine = loaded(formset)?;
            ShellRunResult {
                state_changed: false,
                output: serde_json::to_value(engine.summarize_state())
                    .map_err(|e| format!("Could not serialize state summary: {e}"))?,
            }
        }
        ShellCommand::Init { document, options } => {
            let container = Element::from_xml_file(document).map_err(|e| e.to_string())?;
            let options = match options {
                Some(path) => {
                    let text = fs::read_to_string(path)
                        .map_err(|e| format!("Could not read options file '{path}': {e}"))?;
                    serde_json::from_str::<FormsetOptions>(&text)
                        .map_err(|e| format!("Invalid options JSON '{path}': {e}"))?
                }
                None => FormsetOptions::default(),
            };
            let engine = Formset::new(container, options).map_err(|e| e.to_string())?;
            let summary = engine.summarize_state();
            *formset = Some(engine);
            ShellRunResult {
                state_changed: true,
                output: json!({
                    "message": format!("Initialized row set from '{document}'"),
                    "summary": summary
                }),
            }
        }
        ShellCommand::LoadProject { path } => {
            let state = FormsetState::load_from_path(path).map_err(|e| e.to_string())?;
            let engine = Formset::from_state(state).map_err(|e| e.to_string())?;
            let summary = engine.summarize_state();
            *formset = Some(engine);
            ShellRunResult {
                state_changed: true,
                output: json!({
                    "message": format!("Loaded row-set state from '{path}'"),
                    "summary": summary
                }),
            }
        }
        ShellCommand::SaveProject { path } => {
            let engine = loaded(formset)?;
            engine.state().save_to_path(path).map_err(|e| e.to_string())?;
            ShellRunResult {
                state_changed: false,
                output: json!({ "message": format!("Saved row-set state to '{path}'") }),
            }
        }
        ShellCommand::ExportDocument { path } => {
            let engine = loaded(formset)?;
            engine
                .render_document()
                .to_xml_file(path)
                .map_err(|e| e.to_string())?;
            ShellRunResult {
                state_changed: false,
                output: json!({ "message": format!("Exported rendered markup to '{path}'") }),
            }
        }
        ShellCommand::ExportNames => {
            let engine = loaded(formset)?;
            let names: Vec<Value> = engine
                .wire_payload()
                .into_iter()
                .map(|(name, value)| json!({ "name": name, "value": value }))
                .collect();
            ShellRunResult {
                state_changed: false,
                output: json!({ "fields": names }),
            }
        }
        ShellCommand::Op { payload } => {
            let json_text = parse_json_payload(payload)?;
            let op: Operation = serde_json::from_str(&json_text)
                .map_err(|e| format!("Invalid operation JSON: {e}"))?;
            let engine = loaded(formset)?;
            let op_result = engine.apply(op).map_err(|e| e.to_string())?;
            ShellRunResult {
                state_changed: true,
                output: json!({ "result": op_result }),
            }
        }
        ShellCommand::Workflow { payload } => {
            let json_text = parse_json_payload(payload)?;
            let workflow: Workflow = serde_json::from_str(&json_text)
                .map_err(|e| format!("Invalid workflow JSON: {e}"))?;
            let engine = loaded(formset)?;
            let results = engine.apply_workflow(workflow).map_err(|e| e.to_string())?;
            ShellRunResult {
                state_changed: true,
                output: json!({ "results": results }),
            }
        }
    };
    Ok(result)
}
