use std::path::PathBuf;

use comfygate_pipeline::coordinator::INTERRUPT_GRACE;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development against a
/// ComfyUI server on the same machine.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `600`).
    pub request_timeout_secs: u64,
    /// Wall-clock limit for one engine run in seconds (default: `300`).
    pub run_timeout_secs: u64,
    /// Base URL of the ComfyUI server.
    pub comfyui_url: String,
    /// Directory holding the engine's `input/`, `output/` and `temp/` roots.
    pub engine_root: PathBuf,
    /// `bucket` or `s3://bucket/prefix`. Unset disables remote persistence.
    pub output_bucket: Option<String>,
    /// Custom S3-compatible endpoint.
    pub s3_endpoint_url: Option<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `8000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:3000`    |
    /// | `REQUEST_TIMEOUT_SECS` | `600`                      |
    /// | `RUN_TIMEOUT_SECS`     | `300`                      |
    /// | `COMFYUI_URL`          | `http://127.0.0.1:8188`    |
    /// | `ENGINE_ROOT`          | `.`                        |
    /// | `OUTPUT_BUCKET`        | unset                      |
    /// | `S3_ENDPOINT_URL`      | unset                      |
    ///
    /// Panics at startup if a value does not parse or the timeouts are
    /// inconsistent (see [`ServerConfig::validate`]).
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "600".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let run_timeout_secs: u64 = std::env::var("RUN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "300".into())
            .parse()
            .expect("RUN_TIMEOUT_SECS must be a valid u64");

        let comfyui_url =
            std::env::var("COMFYUI_URL").unwrap_or_else(|_| "http://127.0.0.1:8188".into());

        let engine_root = PathBuf::from(std::env::var("ENGINE_ROOT").unwrap_or_else(|_| ".".into()));

        let config = Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            run_timeout_secs,
            comfyui_url,
            engine_root,
            output_bucket: optional_var("OUTPUT_BUCKET"),
            s3_endpoint_url: optional_var("S3_ENDPOINT_URL"),
        };
        config.validate().unwrap_or_else(|e| panic!("{e}"));
        config
    }

    /// The HTTP request timeout must outlast a timed-out run, including the
    /// wait for the engine to acknowledge the interrupt. Otherwise the
    /// request is cut off with 408 before the run reports its timeout.
    pub fn validate(&self) -> Result<(), String> {
        let needed = self.run_timeout_secs + INTERRUPT_GRACE.as_secs();
        if self.request_timeout_secs <= needed {
            return Err(format!(
                "REQUEST_TIMEOUT_SECS ({}) must exceed RUN_TIMEOUT_SECS ({}) plus {}s",
                self.request_timeout_secs,
                self.run_timeout_secs,
                INTERRUPT_GRACE.as_secs(),
            ));
        }
        Ok(())
    }
}

/// An env var that counts as unset when empty.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(request_timeout_secs: u64, run_timeout_secs: u64) -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            cors_origins: vec![],
            request_timeout_secs,
            run_timeout_secs,
            comfyui_url: "http://127.0.0.1:8188".into(),
            engine_root: PathBuf::from("."),
            output_bucket: None,
            s3_endpoint_url: None,
        }
    }

    #[test]
    fn defaults_leave_room_for_run_timeout() {
        assert!(config(600, 300).validate().is_ok());
    }

    #[test]
    fn request_timeout_must_outlast_run() {
        let err = config(300, 300).validate().unwrap_err();
        assert!(err.contains("REQUEST_TIMEOUT_SECS (300)"));
        assert!(config(310, 300).validate().is_err());
        assert!(config(311, 300).validate().is_ok());
    }
}
