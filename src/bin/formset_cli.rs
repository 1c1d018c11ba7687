use formset::formset::{FormEngine, Formset, FormsetState};
use formset::formset_shell::{execute_shell_command, parse_shell_tokens};
use serde::Serialize;
use std::{env, path::Path};

const DEFAULT_STATE_PATH: &str = ".formset_state.json";

fn usage() {
    eprintln!(
        "Usage:\n  \
  formset_cli --version\n  \
  formset_cli [--state PATH] capabilities\n  \
  formset_cli [--state PATH] init DOCUMENT.xml [OPTIONS.json]\n  \
  formset_cli [--state PATH] op '<operation-json>'\n  \
  formset_cli [--state PATH] workflow '<workflow-json>'\n  \
  formset_cli [--state PATH] state-summary\n  \
  formset_cli [--state PATH] export-names\n  \
  formset_cli [--state PATH] export-document OUTPUT.xml\n  \
  formset_cli [--state PATH] save-project PATH\n  \
  formset_cli [--state PATH] load-project PATH\n\n  \
  Tip: pass @file.json instead of inline JSON"
    );
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Could not serialize JSON output: {e}"))?;
    println!("{text}");
    Ok(())
}

fn parse_global_state_arg(args: &[String]) -> (String, usize) {
    if args.len() >= 3 && args[1] == "--state" {
        return (args[2].clone(), 3);
    }
    (DEFAULT_STATE_PATH.to_string(), 1)
}

fn load_session(state_path: &str) -> Result<Option<Formset>, String> {
    if !Path::new(state_path).exists() {
        return Ok(None);
    }
    let state = FormsetState::load_from_path(state_path).map_err(|e| e.to_string())?;
    let engine = Formset::from_state(state).map_err(|e| e.to_string())?;
    Ok(Some(engine))
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().collect();
    if args.len() <= 1 {
        usage();
        return Err("Missing command".to_string());
    }
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("formset {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let (state_path, cmd_idx) = parse_global_state_arg(&args);
    if args.len() <= cmd_idx {
        usage();
        return Err("Missing command".to_string());
    }

    let tokens: Vec<String> = args[cmd_idx..].to_vec();
    let command = parse_shell_tokens(&tokens).inspect_err(|_| usage())?;

    let mut session = load_session(&state_path)?;
    let result = execute_shell_command(&mut session, &command)?;
    if result.state_changed {
        if let Some(engine) = &session {
            engine
                .state()
                .save_to_path(&state_path)
                .map_err(|e| e.to_string())?;
        }
    }
    print_json(&result.output)
}
