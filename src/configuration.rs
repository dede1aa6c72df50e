use secrecy::Secret;
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub qdrant: QdrantSettings,
    pub gemini: GeminiSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QdrantSettings {
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub api_key: Option<Secret<String>>,
    /// Dimension shared by every embedded collection, fixed by the embedding model
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub collection_vector_size: u64,
    pub collection_distance: String,
    pub knowledge_collection: String,
    pub queries_collection: String,
    pub users_collection: String,
}

impl QdrantSettings {
    pub fn get_grpc_base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeminiSettings {
    pub api_key: Secret<String>,
    pub base_url: String,
    pub embedding_model: String,
    pub generation_model: String,
}

impl GeminiSettings {
    /// The api key travels in a request header, never in these URLs: transport
    /// errors display the URL and must not expose the secret.
    pub fn embed_content_url(&self) -> String {
        format!(
            "{}/models/{}:embedContent",
            self.base_url, self.embedding_model
        )
    }

    pub fn generate_content_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url, self.generation_model
        )
    }
}

/// Extracts app settings from configuration files and env variables
///
/// `base.yaml` contains settings shared by all environments, overridden by
/// `local.yaml` or `production.yaml` depending on `APP_ENVIRONMENT`
/// (default: `local`).
///
/// Settings are also taken from environment variables, with a prefix of APP
/// and '__' as separator: `APP_GEMINI__API_KEY` sets `Settings.gemini.api_key`.
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir().expect("Failed to determine the current directory");
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .expect("Failed to parse APP_ENVIRONMENT.");
    let environment_filename = format!("{}.yaml", environment.as_str());

    let settings = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(config::File::from(
            configuration_directory.join(environment_filename),
        ))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}

/// The possible runtime environments for the service.
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}
