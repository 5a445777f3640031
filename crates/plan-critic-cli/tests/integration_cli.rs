use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use anyhow::{ensure, Context, Result};
use serde_json::{json, Value};

fn plan_critic(args: &[&str]) -> Result<Output> {
    let out = Command::new(env!("CARGO_BIN_EXE_plan-critic"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .context("spawning plan-critic")?;
    Ok(out)
}

fn stdout_json(out: &Output) -> Result<Value> {
    ensure!(
        out.status.success(),
        "plan-critic failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    Ok(serde_json::from_slice(&out.stdout)?)
}

fn write_training_log(path: &Path) -> Result<()> {
    let objects = ["table", "desk", "shelf", "counter"];
    let mut rows = Vec::new();
    for i in 0..40 {
        let obj = objects[i % objects.len()];
        rows.push(json!({
            "instruction": "Tidy the table",
            "function_sequence": "<Plan>move_to(kitchen) tidy(table)</Plan>",
            "clarifying_history": [{"question": "Which room?", "answer": "kitchen"}],
            "information": "room=kitchen",
            "label": "sufficient",
        }));
        rows.push(json!({
            "instruction": format!("Tidy the {obj}"),
            "label": "insufficient",
        }));
    }
    fs::write(path, serde_json::to_vec_pretty(&Value::Array(rows))?)?;
    Ok(())
}

/// train -> decide -> inspect through the binary.
#[test]
fn integration_cli_train_decide_inspect() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let train = dir.path().join("critic_dataset_train.json");
    write_training_log(&train)?;
    let models = dir.path().join("models");

    // Missing validation file: the pools are merged and re-split.
    let out = plan_critic(&[
        "train",
        "--train",
        train.to_str().unwrap(),
        "--valid",
        dir.path().join("critic_dataset_valid.json").to_str().unwrap(),
        "--out-dir",
        models.to_str().unwrap(),
        "--json",
    ])?;
    let summary = stdout_json(&out)?;
    assert_eq!(summary["resplit"], json!(true));
    assert_eq!(summary["train_size"].as_u64().unwrap() + summary["valid_size"].as_u64().unwrap(), 80);
    let artifact = summary["artifact"].as_str().unwrap().to_string();
    assert!(Path::new(&artifact).exists());

    let record = dir.path().join("snapshot.json");
    fs::write(
        &record,
        serde_json::to_vec(&json!({
            "instruction": "Tidy the table",
            "function_sequence": "<Plan>move_to(kitchen) tidy(table)</Plan>",
            "clarifying_history": [{"clarifying_question": "Which room?", "chat_input": "kitchen"}],
            "information": "room=kitchen"
        }))?,
    )?;

    let out = plan_critic(&[
        "decide",
        "--model-dir",
        models.to_str().unwrap(),
        "--record",
        record.to_str().unwrap(),
        "--turn-count",
        "1",
        "--json",
    ])?;
    let decision = stdout_json(&out)?;
    assert_eq!(decision["fallback"], json!(false));
    assert_eq!(decision["outcome"], json!("sufficient"));
    assert!(decision["effective_threshold"].as_f64().unwrap() >= 0.6);

    let out = plan_critic(&["inspect", "--model", &artifact, "--json"])?;
    let info = stdout_json(&out)?;
    assert_eq!(info["format_version"], json!("plan-critic-1"));
    assert_eq!(info["metrics"]["train_size"], summary["train_size"]);
    Ok(())
}

/// Without a model the turn-limit fallback decides, and says so.
#[test]
fn integration_cli_decide_falls_back_without_model() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let record = dir.path().join("snapshot.json");
    fs::write(&record, r#"{"instruction": "Bring me a cup"}"#)?;
    let empty = dir.path().join("models");
    fs::create_dir_all(&empty)?;

    let decide_at = |turns: &str| -> Result<Value> {
        stdout_json(&plan_critic(&[
            "decide",
            "--model-dir",
            empty.to_str().unwrap(),
            "--record",
            record.to_str().unwrap(),
            "--turn-count",
            turns,
            "--json",
        ])?)
    };

    let early = decide_at("1")?;
    assert_eq!(early["fallback"], json!(true));
    assert_eq!(early["outcome"], json!("continue"));
    assert!(early["error"].as_str().unwrap().contains("model unavailable"));

    let late = decide_at("4")?;
    assert_eq!(late["outcome"], json!("sufficient"));
    Ok(())
}

/// A corrupt artifact is reported as unavailable rather than failing the run.
#[test]
fn integration_cli_corrupt_model_uses_fallback() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let model = dir.path().join("critic_model_20240101_000000.json");
    fs::write(&model, "{ truncated")?;
    let record = dir.path().join("snapshot.json");
    fs::write(&record, "{}")?;

    let out = plan_critic(&[
        "decide",
        "--model",
        model.to_str().unwrap(),
        "--record",
        record.to_str().unwrap(),
        "--turn-count",
        "0",
        "--fallback-max-turns",
        "3",
    ])?;
    ensure!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let text = String::from_utf8(out.stdout)?;
    assert!(text.contains("outcome=continue"));
    assert!(text.contains("fallback=turn-limit"));
    Ok(())
}

/// Invalid gate settings are rejected up front.
#[test]
fn integration_cli_rejects_invalid_margin() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let record = dir.path().join("snapshot.json");
    fs::write(&record, "{}")?;
    let out = plan_critic(&[
        "decide",
        "--model-dir",
        dir.path().to_str().unwrap(),
        "--record",
        record.to_str().unwrap(),
        "--turn-count",
        "0",
        "--margin",
        "2.0",
    ])?;
    assert!(!out.status.success());
    Ok(())
}
