use std::io::Write;

use tempfile::NamedTempFile;

use docpipe::config::{load_processing_config, ProcessorConfig};
use docpipe::error::DocPipeError;

// Helper to create a temporary config file with given content
fn create_temp_config_file(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
    writeln!(temp_file, "{}", content).expect("Failed to write to temp file");
    temp_file
}

#[test]
fn test_load_valid_config() {
    let yaml_content = r#"
processors:
  - type: DocumentQuality
    backend_processor_id: projects/test/processors/quality
  - type: IdProofing
    backend_processor_id: projects/test/processors/id-proofing
    "#;
    let temp_file = create_temp_config_file(yaml_content);
    let config_result = load_processing_config(temp_file.path());

    assert!(
        config_result.is_ok(),
        "Should load valid config: {:?}",
        config_result.err()
    );
    let config = config_result.unwrap();
    assert_eq!(config.processors.len(), 2);
    match &config.processors[0] {
        ProcessorConfig::DocumentQuality(params) => {
            assert_eq!(
                params.backend_processor_id,
                "projects/test/processors/quality"
            );
        }
        _ => panic!("Expected DocumentQuality"),
    }
    match &config.processors[1] {
        ProcessorConfig::IdProofing(params) => {
            assert_eq!(
                params.backend_processor_id,
                "projects/test/processors/id-proofing"
            );
        }
        _ => panic!("Expected IdProofing"),
    }
}

#[test]
fn test_load_config_unknown_processor_type() {
    let yaml_content = r#"
processors:
  - type: FrobnicationFilter
    backend_processor_id: whatever
    "#;
    let temp_file = create_temp_config_file(yaml_content);
    let config_result = load_processing_config(temp_file.path());

    assert!(matches!(
        config_result,
        Err(DocPipeError::ConfigError(_))
    ));
}

#[test]
fn test_load_config_empty_processor_list_is_invalid() {
    let yaml_content = "processors: []";
    let temp_file = create_temp_config_file(yaml_content);
    let config_result = load_processing_config(temp_file.path());

    assert!(matches!(
        config_result,
        Err(DocPipeError::ConfigError(_))
    ));
}

#[test]
fn test_load_config_duplicate_processor_is_invalid() {
    let yaml_content = r#"
processors:
  - type: DocumentQuality
    backend_processor_id: projects/test/processors/quality
  - type: DocumentQuality
    backend_processor_id: projects/test/processors/quality-2
    "#;
    let temp_file = create_temp_config_file(yaml_content);
    let config_result = load_processing_config(temp_file.path());

    assert!(matches!(
        config_result,
        Err(DocPipeError::ConfigError(_))
    ));
}

#[test]
fn test_load_config_blank_backend_processor_id_is_invalid() {
    let yaml_content = r#"
processors:
  - type: IdProofing
    backend_processor_id: "  "
    "#;
    let temp_file = create_temp_config_file(yaml_content);
    let config_result = load_processing_config(temp_file.path());

    assert!(matches!(
        config_result,
        Err(DocPipeError::ConfigError(_))
    ));
}

#[test]
fn test_load_config_missing_file() {
    let config_result = load_processing_config("definitely/not/a/real/path.yaml");
    assert!(matches!(
        config_result,
        Err(DocPipeError::ConfigError(_))
    ));
}
