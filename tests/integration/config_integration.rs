//! Configuration loading through the public loader

use dialogue_gen::config::{ConfigLoader, DialogueGenConfig};
use dialogue_gen::provider::{ClientRegistry, HttpRequest, HttpResponse, HttpTransport};
use dialogue_gen::error::TransportError;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// Serializes environment mutation across tests in this binary
static ENV_MUTEX: Mutex<()> = Mutex::new(());

struct OfflineTransport;

#[async_trait]
impl HttpTransport for OfflineTransport {
    async fn post(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
        Err(TransportError::connection("offline"))
    }
}

fn load_isolated(workspace: &TempDir, vars: &[(&str, &str)]) -> DialogueGenConfig {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let xdg = workspace.path().join("xdg");
    let original_xdg = std::env::var("XDG_CONFIG_HOME").ok();
    std::env::set_var("XDG_CONFIG_HOME", &xdg);
    for (key, value) in vars {
        std::env::set_var(key, value);
    }

    let config = ConfigLoader::load(workspace.path());

    for (key, _) in vars {
        std::env::remove_var(key);
    }
    match original_xdg {
        Some(orig) => std::env::set_var("XDG_CONFIG_HOME", orig),
        None => std::env::remove_var("XDG_CONFIG_HOME"),
    }
    config.unwrap()
}

#[test]
fn test_environment_overrides_workspace_file() {
    let workspace = TempDir::new().unwrap();
    std::fs::create_dir_all(workspace.path().join("config")).unwrap();
    std::fs::write(
        workspace.path().join("config").join("config.toml"),
        r#"
[generation]
api_key = "from-file"
model = "gpt-3.5-turbo"
temperature = 0.7
"#,
    )
    .unwrap();

    let config = load_isolated(
        &workspace,
        &[
            ("DIALOGUE_GEN__GENERATION__API_KEY", "from-env"),
            ("DIALOGUE_GEN__GENERATION__REQUEST_TIMEOUT_SECS", "30"),
        ],
    );

    assert_eq!(config.generation.api_key, "from-env");
    assert_eq!(config.generation.model, "gpt-3.5-turbo");
    assert_eq!(config.generation.temperature, 0.7);
    assert_eq!(config.generation.request_timeout_secs, 30);
    assert!(config.validate().is_ok());
}

#[test]
fn test_environment_specific_file_layers_over_base() {
    let workspace = TempDir::new().unwrap();
    let config_dir = workspace.path().join("config");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("config.toml"),
        "[generation]\nmodel = \"gpt-4\"\n",
    )
    .unwrap();
    std::fs::write(
        config_dir.join("staging.toml"),
        "[generation]\nmodel = \"staging-model\"\ncustom_models = [\"staging-model\"]\n",
    )
    .unwrap();

    let config = load_isolated(&workspace, &[("DIALOGUE_GEN_ENV", "staging")]);
    assert_eq!(config.generation.model, "staging-model");
    assert_eq!(
        config.generation.model_options(),
        vec!["gpt-4", "gpt-3.5-turbo", "staging-model"]
    );
}

#[test]
fn test_disabled_config_does_not_resolve_a_client() {
    let workspace = TempDir::new().unwrap();
    std::fs::create_dir_all(workspace.path().join("config")).unwrap();
    std::fs::write(
        workspace.path().join("config").join("config.toml"),
        "[generation]\nenabled = false\n",
    )
    .unwrap();

    let config = load_isolated(&workspace, &[]);
    assert!(!config.generation.enabled);
    let resolved = ClientRegistry::with_defaults()
        .resolve(&config.generation, Arc::new(OfflineTransport));
    assert!(resolved.is_err());
}
