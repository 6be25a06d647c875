use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_API_ADDR: &str = "127.0.0.1:5001";
const DEFAULT_DETECTOR_BACKEND: &str = if cfg!(feature = "backend-tract") {
    "tract"
} else {
    "stub"
};
const DEFAULT_MODEL_PATH: &str = "models/yolov3.onnx";
const DEFAULT_INPUT_SIZE: u32 = 416;
const DEFAULT_PERSON_CLASS_ID: usize = 0;
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;
const DEFAULT_NMS_THRESHOLD: f32 = 0.4;
const DEFAULT_DISTANCE_THRESHOLD: f32 = crate::tracker::DEFAULT_DISTANCE_THRESHOLD;
const DEFAULT_MAX_SESSIONS: usize = crate::tracker::DEFAULT_MAX_SESSIONS;
const DEFAULT_MAX_CONNECTIONS: usize = crate::api::DEFAULT_MAX_CONNECTIONS;
const DEFAULT_SOURCE: &str = "stub://hallway";
const DEFAULT_SOURCE_FPS: u32 = 10;
const DEFAULT_NOTIFY_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    detector: Option<DetectorConfigFile>,
    thresholds: Option<ThresholdConfigFile>,
    api: Option<ApiConfigFile>,
    source: Option<SourceConfigFile>,
    notify: Option<NotifyConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
    person_class_id: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct ThresholdConfigFile {
    confidence: Option<f32>,
    score: Option<f32>,
    nms_iou: Option<f32>,
    identity_distance: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
    max_sessions: Option<usize>,
    max_connections: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    path: Option<String>,
    target_fps: Option<u32>,
    repeat: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct NotifyConfigFile {
    backend: Option<String>,
    url: Option<String>,
    api_key: Option<String>,
    sender_email: Option<String>,
    recipient: Option<String>,
    account_sid: Option<String>,
    auth_token: Option<String>,
    from_number: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct DetectionConfig {
    pub detector: DetectorSettings,
    pub thresholds: Thresholds,
    pub api: ApiSettings,
    pub source: SourceSettings,
    pub notify: NotifySettings,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// Backend name: "tract" or "stub".
    pub backend: String,
    pub model_path: PathBuf,
    /// Square network input size in pixels.
    pub input_size: u32,
    pub person_class_id: usize,
}

/// Tuning knobs for the post-processing stages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Candidate floor on `objectness * class score` (strict).
    pub confidence: f32,
    /// NMS score floor (strict).
    pub score: f32,
    /// NMS suppression IoU (strict).
    pub nms_iou: f32,
    /// Centroid distance in pixels under which two detections are one person.
    pub identity_distance: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE_THRESHOLD,
            score: DEFAULT_SCORE_THRESHOLD,
            nms_iou: DEFAULT_NMS_THRESHOLD,
            identity_distance: DEFAULT_DISTANCE_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub addr: String,
    pub max_sessions: usize,
    pub max_connections: usize,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    /// Image file, directory of images, or `stub://<name>`.
    pub path: String,
    pub target_fps: u32,
    pub repeat: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyBackend {
    None,
    Log,
    Webhook,
    Email,
    Sms,
}

impl NotifyBackend {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "none" | "off" => Ok(Self::None),
            "log" => Ok(Self::Log),
            "webhook" | "http" => Ok(Self::Webhook),
            "email" | "brevo" => Ok(Self::Email),
            "sms" | "twilio" => Ok(Self::Sms),
            other => Err(anyhow!(
                "unknown notify backend '{}'; expected none, log, webhook, email or sms",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotifySettings {
    pub backend: NotifyBackend,
    /// Webhook target, or an endpoint override for the email/sms providers.
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub sender_email: Option<String>,
    /// Email address or phone number, depending on backend.
    pub recipient: Option<String>,
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
    pub timeout: Duration,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            backend: NotifyBackend::Log,
            url: None,
            api_key: None,
            sender_email: None,
            recipient: None,
            account_sid: None,
            auth_token: None,
            from_number: None,
            timeout: Duration::from_secs(DEFAULT_NOTIFY_TIMEOUT_SECS),
        }
    }
}

impl DetectionConfig {
    /// Load defaults, then `HALLWAY_CONFIG` (TOML, or JSON by extension), then env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("HALLWAY_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: DetectionConfigFile) -> Result<Self> {
        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            backend: detector_file
                .backend
                .unwrap_or_else(|| DEFAULT_DETECTOR_BACKEND.to_string()),
            model_path: detector_file
                .model_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            input_size: detector_file.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
            person_class_id: detector_file
                .person_class_id
                .unwrap_or(DEFAULT_PERSON_CLASS_ID),
        };

        let thresholds_file = file.thresholds.unwrap_or_default();
        let thresholds = Thresholds {
            confidence: thresholds_file
                .confidence
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            score: thresholds_file.score.unwrap_or(DEFAULT_SCORE_THRESHOLD),
            nms_iou: thresholds_file.nms_iou.unwrap_or(DEFAULT_NMS_THRESHOLD),
            identity_distance: thresholds_file
                .identity_distance
                .unwrap_or(DEFAULT_DISTANCE_THRESHOLD),
        };

        let api_file = file.api.unwrap_or_default();
        let api = ApiSettings {
            addr: api_file
                .addr
                .unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
            max_sessions: api_file.max_sessions.unwrap_or(DEFAULT_MAX_SESSIONS),
            max_connections: api_file
                .max_connections
                .unwrap_or(DEFAULT_MAX_CONNECTIONS),
        };

        let source_file = file.source.unwrap_or_default();
        let source = SourceSettings {
            path: source_file
                .path
                .unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            target_fps: source_file.target_fps.unwrap_or(DEFAULT_SOURCE_FPS),
            repeat: source_file.repeat.unwrap_or(false),
        };

        let notify_file = file.notify.unwrap_or_default();
        let notify = NotifySettings {
            backend: match notify_file.backend.as_deref() {
                Some(value) => NotifyBackend::parse(value)?,
                None => NotifyBackend::Log,
            },
            url: notify_file.url,
            api_key: notify_file.api_key,
            sender_email: notify_file.sender_email,
            recipient: notify_file.recipient,
            account_sid: notify_file.account_sid,
            auth_token: notify_file.auth_token,
            from_number: notify_file.from_number,
            timeout: Duration::from_secs(
                notify_file
                    .timeout_secs
                    .unwrap_or(DEFAULT_NOTIFY_TIMEOUT_SECS),
            ),
        };

        Ok(Self {
            detector,
            thresholds,
            api,
            source,
            notify,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = non_empty_env("HALLWAY_API_ADDR") {
            self.api.addr = addr;
        }
        if let Some(backend) = non_empty_env("HALLWAY_DETECTOR_BACKEND") {
            self.detector.backend = backend;
        }
        if let Some(path) = non_empty_env("HALLWAY_MODEL_PATH") {
            self.detector.model_path = PathBuf::from(path);
        }
        if let Some(source) = non_empty_env("HALLWAY_SOURCE") {
            self.source.path = source;
        }
        if let Some(backend) = non_empty_env("HALLWAY_NOTIFY_BACKEND") {
            self.notify.backend = NotifyBackend::parse(&backend)?;
        }
        if let Some(url) = non_empty_env("HALLWAY_NOTIFY_URL") {
            self.notify.url = Some(url);
        }
        if let Some(key) = non_empty_env("HALLWAY_NOTIFY_API_KEY") {
            self.notify.api_key = Some(key);
        }
        if let Some(token) = non_empty_env("HALLWAY_NOTIFY_AUTH_TOKEN") {
            self.notify.auth_token = Some(token);
        }
        if let Some(value) = non_empty_env("HALLWAY_CONFIDENCE_THRESHOLD") {
            self.thresholds.confidence = parse_f32("HALLWAY_CONFIDENCE_THRESHOLD", &value)?;
        }
        if let Some(value) = non_empty_env("HALLWAY_NMS_THRESHOLD") {
            self.thresholds.nms_iou = parse_f32("HALLWAY_NMS_THRESHOLD", &value)?;
        }
        if let Some(value) = non_empty_env("HALLWAY_DISTANCE_THRESHOLD") {
            self.thresholds.identity_distance = parse_f32("HALLWAY_DISTANCE_THRESHOLD", &value)?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.detector.backend = self.detector.backend.trim().to_lowercase();
        for (name, value) in [
            ("confidence", self.thresholds.confidence),
            ("score", self.thresholds.score),
            ("nms_iou", self.thresholds.nms_iou),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} threshold must be within [0, 1], got {}", name, value));
            }
        }
        let distance = self.thresholds.identity_distance;
        if distance.is_nan() || distance <= 0.0 {
            return Err(anyhow!("identity distance threshold must be greater than zero"));
        }
        if self.detector.input_size == 0 {
            return Err(anyhow!("detector input size must be greater than zero"));
        }
        if self.api.max_sessions == 0 {
            return Err(anyhow!("api max_sessions must be greater than zero"));
        }
        if self.api.max_connections == 0 {
            return Err(anyhow!("api max_connections must be greater than zero"));
        }
        if self.source.target_fps == 0 {
            return Err(anyhow!("source target_fps must be >= 1"));
        }
        self.validate_notify()
    }

    fn validate_notify(&self) -> Result<()> {
        let n = &self.notify;
        match n.backend {
            NotifyBackend::None | NotifyBackend::Log => Ok(()),
            NotifyBackend::Webhook => {
                let url = n
                    .url
                    .as_deref()
                    .ok_or_else(|| anyhow!("webhook notifications require notify.url"))?;
                url::Url::parse(url)
                    .map_err(|e| anyhow!("invalid notify.url '{}': {}", url, e))?;
                Ok(())
            }
            NotifyBackend::Email => {
                require(&n.api_key, "email notifications require notify.api_key")?;
                require(&n.sender_email, "email notifications require notify.sender_email")?;
                require(&n.recipient, "email notifications require notify.recipient")
            }
            NotifyBackend::Sms => {
                require(&n.account_sid, "sms notifications require notify.account_sid")?;
                require(&n.auth_token, "sms notifications require notify.auth_token")?;
                require(&n.from_number, "sms notifications require notify.from_number")?;
                require(&n.recipient, "sms notifications require notify.recipient")
            }
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            detector: DetectorSettings {
                backend: DEFAULT_DETECTOR_BACKEND.to_string(),
                model_path: PathBuf::from(DEFAULT_MODEL_PATH),
                input_size: DEFAULT_INPUT_SIZE,
                person_class_id: DEFAULT_PERSON_CLASS_ID,
            },
            thresholds: Thresholds::default(),
            api: ApiSettings {
                addr: DEFAULT_API_ADDR.to_string(),
                max_sessions: DEFAULT_MAX_SESSIONS,
                max_connections: DEFAULT_MAX_CONNECTIONS,
            },
            source: SourceSettings {
                path: DEFAULT_SOURCE.to_string(),
                target_fps: DEFAULT_SOURCE_FPS,
                repeat: false,
            },
            notify: NotifySettings::default(),
        }
    }
}

fn read_config_file(path: &Path) -> Result<DetectionConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let cfg = if is_json {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_f32(key: &str, value: &str) -> Result<f32> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow!("{} must be a number, got '{}'", key, value))
}

fn require(value: &Option<String>, message: &str) -> Result<()> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(anyhow!("{}", message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() {
        let cfg = DetectionConfig::from_file(DetectionConfigFile::default()).unwrap();
        assert_eq!(cfg.thresholds, Thresholds::default());
        assert_eq!(cfg.thresholds.confidence, 0.5);
        assert_eq!(cfg.thresholds.nms_iou, 0.4);
        assert_eq!(cfg.thresholds.identity_distance, 50.0);
        assert_eq!(cfg.detector.input_size, 416);
        assert_eq!(cfg.notify.backend, NotifyBackend::Log);
    }

    #[test]
    fn default_backend_is_one_this_build_can_load() {
        let cfg = DetectionConfig::default();
        let expected = if cfg!(feature = "backend-tract") { "tract" } else { "stub" };
        assert_eq!(cfg.detector.backend, expected);
        if expected == "stub" {
            assert!(crate::detect::load_backend(&cfg.detector).is_ok());
        }
    }

    #[test]
    fn parses_toml_sections() {
        let file: DetectionConfigFile = toml::from_str(
            r#"
            [detector]
            backend = "stub"
            [thresholds]
            identity_distance = 75.0
            [notify]
            backend = "webhook"
            url = "http://127.0.0.1:9/notify"
            "#,
        )
        .unwrap();
        let mut cfg = DetectionConfig::from_file(file).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.detector.backend, "stub");
        assert_eq!(cfg.thresholds.identity_distance, 75.0);
        assert_eq!(cfg.notify.backend, NotifyBackend::Webhook);
    }

    #[test]
    fn rejects_out_of_range_thresholds() {
        let mut cfg = DetectionConfig::default();
        cfg.thresholds.nms_iou = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = DetectionConfig::default();
        cfg.thresholds.identity_distance = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn notify_backends_require_credentials() {
        let mut cfg = DetectionConfig::default();
        cfg.notify.backend = NotifyBackend::Webhook;
        assert!(cfg.validate().is_err());
        cfg.notify.url = Some("not a url".to_string());
        assert!(cfg.validate().is_err());
        cfg.notify.url = Some("https://alerts.example.com/notify".to_string());
        assert!(cfg.validate().is_ok());

        cfg.notify.backend = NotifyBackend::Sms;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unknown_notify_backend_is_an_error() {
        assert!(NotifyBackend::parse("pager").is_err());
        assert_eq!(NotifyBackend::parse(" Twilio ").unwrap(), NotifyBackend::Sms);
    }
}
