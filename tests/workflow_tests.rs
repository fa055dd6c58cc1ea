use comfyui_studio::*;
use serde_json::json;
use tempfile::tempdir;

const SDXL_REFINER: &str = r#"{
  "4": {"class_type": "CheckpointLoaderSimple", "inputs": {"ckpt_name": "sd_xl_base_1.0.safetensors"}},
  "6": {"class_type": "CLIPTextEncode", "inputs": {"text": "evening sunset scenery", "clip": ["4", 1]}},
  "10": {"class_type": "KSamplerAdvanced", "inputs": {"add_noise": "enable", "noise_seed": 721897303308196, "steps": 25}},
  "15": {"class_type": "CLIPTextEncode", "inputs": {"text": "evening sunset scenery", "clip": ["12", 1]}},
  "19": {"class_type": "SaveImage", "inputs": {"filename_prefix": "ComfyUI", "images": ["17", 0]}}
}"#;

#[test]
fn test_load_from_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("workflow_api.json");
    std::fs::write(&path, SDXL_REFINER).unwrap();

    let template = WorkflowTemplate::load(&path, NodeBindings::default()).unwrap();
    let keys: Vec<_> = template.graph().keys().map(String::as_str).collect();
    assert_eq!(keys, ["4", "6", "10", "15", "19"]);

    let workflow = template.apply_with_seed("a red fox", 42).unwrap();
    assert_eq!(workflow["6"]["inputs"]["text"], "a red fox");
    assert_eq!(workflow["15"]["inputs"]["text"], "a red fox");
    assert_eq!(workflow["10"]["inputs"]["noise_seed"], 42);
    assert_eq!(workflow["10"]["inputs"]["add_noise"], "enable");
    assert_eq!(workflow["19"], json!({"class_type": "SaveImage", "inputs": {"filename_prefix": "ComfyUI", "images": ["17", 0]}}));
}

#[test]
fn test_apply_keeps_node_order() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("workflow_api.json");
    std::fs::write(&path, SDXL_REFINER).unwrap();

    let template = WorkflowTemplate::load(&path, NodeBindings::default()).unwrap();
    let workflow = template.apply("x").unwrap();
    let keys: Vec<_> = workflow.as_object().unwrap().keys().cloned().collect();
    assert_eq!(keys, ["4", "6", "10", "15", "19"]);
}

#[test]
fn test_missing_file_names_the_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nope.json");

    let err = WorkflowTemplate::load(&path, NodeBindings::default()).unwrap_err();
    assert!(matches!(err, ComfyError::Io { .. }));
    assert!(err.to_string().contains("nope.json"));
}

#[test]
fn test_invalid_json() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{\"6\": ").unwrap();

    let err = WorkflowTemplate::load(&path, NodeBindings::default()).unwrap_err();
    assert!(matches!(err, ComfyError::Json(_)));
}

#[test]
fn test_config_bindings_drive_apply() {
    let config = StudioConfig::from_lookup(|key| match key {
        "COMFY_SERVER_ADDRESS" => Some("127.0.0.1:8188".into()),
        "COMFY_WORKFLOW_PATH" => Some("unused.json".into()),
        "COMFY_PROMPT_NODES" => Some("6".into()),
        "COMFY_SEED_NODE" => Some("10".into()),
        _ => None,
    })
    .unwrap();

    let template = WorkflowTemplate::from_value(
        json!({"6": {"inputs": {"text": ""}}, "10": {"inputs": {"noise_seed": 0}}}),
        config.bindings.clone(),
    )
    .unwrap();
    let workflow = template.apply("only one encoder").unwrap();
    assert_eq!(workflow["6"]["inputs"]["text"], "only one encoder");
}
