use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use embedded_ai_core::{
    BlockingClient, ChatConfig, ChatRelay, GenerationRequest, GenerationResponse, Source,
    TaskFilter,
};
use serde::Serialize;

use crate::{Cli, Commands, TaskCommand};

pub fn run(cli: &Cli) -> Result<()> {
    let client = BlockingClient::new(cli.client_config());

    match &cli.command {
        Commands::Demo {
            datasheet,
            schematic,
            instruction,
            output,
        } => demo(
            &client,
            datasheet.as_deref(),
            schematic.as_deref(),
            instruction,
            output,
        ),
        Commands::Health => print_json(&client.health_check()?),
        Commands::Status => print_json(&client.get_status()?),
        Commands::Docs => print_json(&client.get_docs()?),
        Commands::Generate {
            datasheet,
            schematic,
            instruction,
            output,
            queue,
        } => {
            let request =
                GenerationRequest::new(instruction.as_str(), datasheet.clone(), schematic.clone())?;
            if *queue {
                let accepted = client.generate_code_async(&request)?;
                return print_json(&accepted);
            }
            let response = client.generate_code(&request)?;
            emit_generation(&response, output.as_deref())
        }
        Commands::Analyze { artifact, source } => {
            print_json(&client.analyze(*artifact, source)?)
        }
        Commands::Task { action } => match action {
            TaskCommand::Get { task_id } => print_json(&client.get_task(task_id)?),
            TaskCommand::Result { task_id, output } => {
                let response = client.get_task_result(task_id)?;
                emit_generation(&response, output.as_deref())
            }
            TaskCommand::List { status, limit } => {
                let filter = TaskFilter {
                    status: *status,
                    limit: *limit,
                };
                print_json(&client.list_tasks(&filter)?)
            }
            TaskCommand::Delete { task_id } => print_json(&client.delete_task(task_id)?),
        },
        Commands::Ask {
            query,
            chat_endpoint,
            chat_token,
            chat_user,
            chat_timeout,
        } => {
            let config = ChatConfig::new(chat_endpoint.as_str(), chat_token.as_str(), chat_user.as_str())
                .with_timeout(Duration::from_secs(*chat_timeout));
            println!("{}", ChatRelay::new(config).ask_or_explain(query));
            Ok(())
        }
    }
}

fn demo(
    client: &BlockingClient,
    datasheet: Option<&Path>,
    schematic: Option<&Path>,
    instruction: &str,
    output: &Path,
) -> Result<()> {
    println!("== health ==");
    print_json(&client.health_check()?)?;

    println!("== status ==");
    print_json(&client.get_status()?)?;

    let (Some(datasheet), Some(schematic)) = (datasheet, schematic) else {
        println!("pass a datasheet and a schematic to generate code");
        return Ok(());
    };

    println!("== generate ==");
    let request = GenerationRequest::new(
        instruction,
        Some(Source::local(datasheet)),
        Some(Source::local(schematic)),
    )?;
    let response = client.generate_code(&request)?;
    emit_generation(&response, Some(output))
}

/// Without `output` the envelope is printed as-is. With it, a failed
/// generation is an error and only successful code is written.
fn emit_generation(response: &GenerationResponse, output: Option<&Path>) -> Result<()> {
    let Some(path) = output else {
        return print_json(response);
    };
    if !response.is_success() {
        bail!(
            "generation failed: {}",
            response.message.as_deref().unwrap_or(response.status.as_str())
        );
    }
    let Some(code) = response.generated_code.as_deref() else {
        tracing::warn!(path = %path.display(), "response carried no code");
        return print_json(response);
    };

    write_code(path, code)?;
    println!("generated code saved to {}", path.display());
    if let Some(time) = response
        .metadata
        .as_ref()
        .and_then(|m| m.processing_time_ms)
    {
        println!("processing time: {time} ms");
    }
    Ok(())
}

fn write_code(path: &Path, code: &str) -> Result<()> {
    std::fs::write(path, code)
        .with_context(|| format!("failed to write generated code to {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render response")?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(value: serde_json::Value) -> GenerationResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn generated_code_is_written_to_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.c");
        let reply = response(json!({
            "status": "success",
            "generated_code": "void init(void) {}\n",
            "metadata": {"processing_time_ms": 12}
        }));

        emit_generation(&reply, Some(&path)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "void init(void) {}\n");
    }

    #[test]
    fn failed_generation_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.c");
        let reply = response(json!({
            "status": "error",
            "generated_code": "/* partial */",
            "message": "model unavailable"
        }));

        let err = emit_generation(&reply, Some(&path)).unwrap_err();
        assert_eq!(err.to_string(), "generation failed: model unavailable");
        assert!(!path.exists());
    }

    #[test]
    fn success_without_code_leaves_output_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.c");
        let reply = response(json!({"status": "success"}));

        emit_generation(&reply, Some(&path)).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn unwritable_output_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.c");
        let err = write_code(&path, "x").unwrap_err();
        assert!(err.to_string().contains("failed to write generated code"));
    }
}
