use std::path::PathBuf;

use clap::Parser;
use retry_policy::BackoffConfig;
use url::Url;

#[derive(Parser, Debug, Clone)]
#[command(name = "transcribe-server", about = "Stores audio uploads and transcribes them")]
pub struct Args {
    #[clap(long, env = "HTTP_ADDR", default_value = "127.0.0.1:8080")]
    pub(crate) http_addr: String,
    #[clap(long, env = "AUDIO_STORAGE_PATH", default_value = "./storage/audio")]
    pub(crate) storage_root: PathBuf,
    #[clap(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub(crate) openai_api_key: String,
    #[clap(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub(crate) openai_base_url: Url,
    #[clap(long, env = "WHISPER_MODEL", default_value = "whisper-1")]
    pub(crate) model: String,
    #[clap(long, default_value_t = 120)]
    pub(crate) request_timeout_secs: u64,
    /// Total tries per transcription, including the first.
    #[clap(long, default_value_t = 3)]
    pub(crate) max_attempts: u32,
    #[clap(long, value_delimiter = ',', default_value = "1000,2000,4000")]
    pub(crate) backoff_delays_ms: Vec<u64>,
    #[clap(long, default_value_t = 50 * 1024 * 1024)]
    pub(crate) max_upload_bytes: usize,
}

impl Args {
    pub fn backoff_config(&self) -> BackoffConfig {
        BackoffConfig::from_millis(self.max_attempts, &self.backoff_delays_ms)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["transcribe-server", "--openai-api-key", "sk-test"]).unwrap();
        assert_eq!(args.http_addr, "127.0.0.1:8080");
        assert_eq!(args.openai_base_url.as_str(), "https://api.openai.com/v1");
        assert_eq!(args.backoff_config(), BackoffConfig::default());
        assert_eq!(args.max_upload_bytes, 52_428_800);
    }

    #[test]
    fn test_backoff_overrides() {
        let args = Args::try_parse_from([
            "transcribe-server",
            "--openai-api-key", "sk-test",
            "--max-attempts", "5",
            "--backoff-delays-ms", "250,500",
        ])
        .unwrap();
        assert_eq!(args.backoff_config(), BackoffConfig::from_millis(5, &[250, 500]));
    }

    #[test]
    fn test_rejects_bad_base_url() {
        let result = Args::try_parse_from([
            "transcribe-server",
            "--openai-api-key", "sk-test",
            "--openai-base-url", "not a url",
        ]);
        assert!(result.is_err());
    }
}
