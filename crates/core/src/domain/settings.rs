use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::error::AppError;

/// ステータスポーリングの方針
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// 待機上限。超えたら TIMED_OUT を合成する。
    pub max_wait: Duration,
    /// ポーリング間隔
    pub interval: Duration,
    /// 連続失敗がこの回数に達したらランを放棄する
    pub max_consecutive_failures: u32,
}

impl PollPolicy {
    /// ceil(max_wait / interval) 回。interval が 0 の場合は 1 回だけ。
    pub fn max_polls(&self) -> u32 {
        let interval = self.interval.as_millis();
        if interval == 0 {
            return 1;
        }
        self.max_wait.as_millis().div_ceil(interval).min(u32::MAX as u128) as u32
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(600),
            interval: Duration::from_secs(5),
            max_consecutive_failures: 3,
        }
    }
}

/// 出力取得のリトライ方針
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    /// 試行ごとに delay に掛ける係数（1.0 = 一定間隔）
    pub backoff: f64,
}

impl RetryPolicy {
    /// 待ち時間なしのポリシー（テスト用）
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay: Duration::ZERO,
            backoff: 1.0,
        }
    }

    /// n 回目（0 始まり）の試行後に待つ時間
    pub fn delay_after(&self, attempt: u32) -> Duration {
        if self.backoff <= 1.0 {
            return self.delay;
        }
        self.delay.mul_f64(self.backoff.powi(attempt as i32))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 12,
            delay: Duration::from_secs(5),
            backoff: 1.0,
        }
    }
}

/// 1ラン分の実行方針
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RunPolicy {
    pub poll: PollPolicy,
    pub output: RetryPolicy,
}

/// 入力ファイルの制限
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputLimits {
    pub max_file_bytes: usize,
    /// 小文字・ドットなし（例: "csv"）
    pub allowed_extensions: Vec<String>,
}

impl Default for InputLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: 2_000_000,
            allowed_extensions: vec!["csv".to_string(), "xlsx".to_string()],
        }
    }
}

/// リモートジョブサービスの接続設定
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// 末尾の "/" は除去済み
    pub host: String,
    pub token: String,
    pub job_id: i64,
    pub payload_param: String,
    pub http_timeout: Duration,
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("host", &self.host)
            .field("token", &"***")
            .field("job_id", &self.job_id)
            .field("payload_param", &self.payload_param)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

/// 監査ストアの保存先
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    File(PathBuf),
    Disabled,
}

/// アプリケーション設定。起動時に1度だけ構築し、各コンストラクタへ明示的に渡す。
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// 未設定なら監査機能は無効（エラーは起動時に1度だけ報告する）
    pub remote: Result<RemoteConfig, AppError>,
    pub limits: InputLimits,
    pub run: RunPolicy,
    pub workers: usize,
    pub store: StoreLocation,
}

impl AppConfig {
    /// プロセス環境変数から構築する
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 任意のキー参照関数から構築する。数値の解析失敗は設定エラー。
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let http_timeout = Duration::from_secs(parse_or(&get, "AUDIT_HTTP_TIMEOUT_SECS", 60u64)?);
        let remote = remote_from(&get, http_timeout);

        let mut limits = InputLimits {
            max_file_bytes: parse_or(&get, "AUDIT_MAX_FILE_BYTES", 2_000_000usize)?,
            ..InputLimits::default()
        };
        if let Some(exts) = get("AUDIT_ALLOWED_EXTENSIONS") {
            limits.allowed_extensions = exts
                .split(',')
                .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect();
        }

        let poll = PollPolicy {
            max_wait: Duration::from_secs(parse_or(&get, "AUDIT_MAX_WAIT_SECS", 600u64)?),
            interval: Duration::from_secs(parse_or(&get, "AUDIT_POLL_INTERVAL_SECS", 5u64)?),
            ..PollPolicy::default()
        };
        if poll.interval.is_zero() || poll.max_wait.is_zero() {
            return Err(AppError::configuration(
                "AUDIT_POLL_INTERVAL_SECS と AUDIT_MAX_WAIT_SECS は 1 以上を指定してください",
            ));
        }

        let output = RetryPolicy {
            max_attempts: parse_or(&get, "AUDIT_OUTPUT_RETRIES", 12u32)?.max(1),
            delay: Duration::from_secs(parse_or(&get, "AUDIT_OUTPUT_RETRY_DELAY_SECS", 5u64)?),
            backoff: 1.0,
        };

        let workers = parse_or(&get, "AUDIT_WORKERS", 4usize)?.max(1);

        let store = match get("AUDIT_DB_PATH") {
            Some(p) if p.eq_ignore_ascii_case("off") => StoreLocation::Disabled,
            Some(p) => StoreLocation::File(PathBuf::from(p)),
            None => StoreLocation::File(default_db_path()),
        };

        Ok(Self {
            remote,
            limits,
            run: RunPolicy { poll, output },
            workers,
            store,
        })
    }
}

fn remote_from<F>(get: &F, http_timeout: Duration) -> Result<RemoteConfig, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    let host = get("DATABRICKS_HOST").map(|h| h.trim_end_matches('/').to_string());
    let token = get("DATABRICKS_TOKEN");
    let job_id = get("DATABRICKS_JOB_ID_AUDIT").and_then(|j| j.parse::<i64>().ok());

    match (host, token, job_id) {
        (Some(host), Some(token), Some(job_id)) if job_id > 0 => Ok(RemoteConfig {
            host,
            token,
            job_id,
            payload_param: get("AUDIT_PAYLOAD_PARAM").unwrap_or_else(|| "file_b64".to_string()),
            http_timeout,
        }),
        _ => Err(AppError::configuration(
            "DATABRICKS_HOST, DATABRICKS_TOKEN y DATABRICKS_JOB_ID_AUDIT deben estar configurados",
        )),
    }
}

fn parse_or<F, T>(get: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match get(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| AppError::configuration(format!("{key} の値が不正です: {raw}"))),
        None => Ok(default),
    }
}

/// 既定の DB パス（ローカルデータディレクトリ配下）
fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("data"))
        .join("audit-bot")
        .join("bot.db")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    const REMOTE: [(&str, &str); 3] = [
        ("DATABRICKS_HOST", "https://dbx.example.com/"),
        ("DATABRICKS_TOKEN", "dapi-secret"),
        ("DATABRICKS_JOB_ID_AUDIT", "42"),
    ];

    #[test]
    fn test_defaults_with_remote() {
        let config = AppConfig::from_lookup(lookup(&REMOTE)).unwrap();
        let remote = config.remote.unwrap();
        assert_eq!(remote.host, "https://dbx.example.com");
        assert_eq!(remote.job_id, 42);
        assert_eq!(remote.payload_param, "file_b64");
        assert_eq!(config.limits.max_file_bytes, 2_000_000);
        assert_eq!(config.run.poll.interval, Duration::from_secs(5));
        assert_eq!(config.run.output.max_attempts, 12);
        assert_eq!(config.workers, 4);
    }

    #[test]
    fn test_missing_remote_disables_feature() {
        let config = AppConfig::from_lookup(lookup(&[("DATABRICKS_HOST", "h")])).unwrap();
        let err = config.remote.unwrap_err();
        assert_eq!(err.code, crate::domain::error::ErrorCode::Configuration);
    }

    #[test]
    fn test_zero_job_id_is_missing() {
        let config = AppConfig::from_lookup(lookup(&[
            ("DATABRICKS_HOST", "h"),
            ("DATABRICKS_TOKEN", "t"),
            ("DATABRICKS_JOB_ID_AUDIT", "0"),
        ]))
        .unwrap();
        assert!(config.remote.is_err());
    }

    #[test]
    fn test_overrides() {
        let mut pairs = REMOTE.to_vec();
        pairs.extend([
            ("AUDIT_MAX_WAIT_SECS", "60"),
            ("AUDIT_POLL_INTERVAL_SECS", "5"),
            ("AUDIT_OUTPUT_RETRIES", "3"),
            ("AUDIT_ALLOWED_EXTENSIONS", ".CSV, txt"),
            ("AUDIT_DB_PATH", "off"),
        ]);
        let config = AppConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.run.poll.max_polls(), 12);
        assert_eq!(config.run.output.max_attempts, 3);
        assert_eq!(config.limits.allowed_extensions, vec!["csv", "txt"]);
        assert_eq!(config.store, StoreLocation::Disabled);
    }

    #[test]
    fn test_invalid_number_is_configuration_error() {
        let mut pairs = REMOTE.to_vec();
        pairs.push(("AUDIT_WORKERS", "many"));
        let err = AppConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(err.message.contains("AUDIT_WORKERS"));
    }

    #[test]
    fn test_token_is_redacted_in_debug() {
        let config = AppConfig::from_lookup(lookup(&REMOTE)).unwrap();
        let debug = format!("{:?}", config.remote.unwrap());
        assert!(!debug.contains("dapi-secret"));
    }

    #[test]
    fn test_max_polls_rounds_up() {
        let policy = PollPolicy {
            max_wait: Duration::from_secs(10),
            interval: Duration::from_secs(3),
            max_consecutive_failures: 3,
        };
        assert_eq!(policy.max_polls(), 4);
    }

    #[test]
    fn test_backoff_delay() {
        let policy = RetryPolicy {
            max_attempts: 4,
            delay: Duration::from_secs(1),
            backoff: 2.0,
        };
        assert_eq!(policy.delay_after(0), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert_eq!(RetryPolicy::immediate(3).delay_after(5), Duration::ZERO);
    }
}
