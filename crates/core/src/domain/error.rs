use serde::Serialize;

/// アプリケーション共通エラーコード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    #[serde(rename = "E_CONFIGURATION")]
    Configuration,
    #[serde(rename = "E_INPUT_REJECTED")]
    InputRejected,
    #[serde(rename = "E_REMOTE")]
    RemoteService,
    #[serde(rename = "E_TIMEOUT")]
    Timeout,
    #[serde(rename = "E_OUTPUT_UNAVAILABLE")]
    OutputUnavailable,
    #[serde(rename = "E_MALFORMED_RESULT")]
    MalformedResult,
    #[serde(rename = "E_STORAGE")]
    Storage,
    #[serde(rename = "E_INTERNAL")]
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "E_CONFIGURATION",
            Self::InputRejected => "E_INPUT_REJECTED",
            Self::RemoteService => "E_REMOTE",
            Self::Timeout => "E_TIMEOUT",
            Self::OutputUnavailable => "E_OUTPUT_UNAVAILABLE",
            Self::MalformedResult => "E_MALFORMED_RESULT",
            Self::Storage => "E_STORAGE",
            Self::Internal => "E_INTERNAL",
        }
    }
}

/// アプリケーションエラー（チャット返信ペイロード兼用）
#[derive(Debug, Clone, Serialize)]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
    pub recoverable: bool,
}

impl AppError {
    /// 設定不足。修正されるまで監査機能は無効になる。
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Configuration,
            message: msg.into(),
            recoverable: false,
        }
    }

    /// 入力ファイルの拒否（拡張子・サイズ）。リモート呼び出し前に返す。
    pub fn input_rejected(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InputRejected,
            message: msg.into(),
            recoverable: true,
        }
    }

    pub fn remote(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::RemoteService,
            message: msg.into(),
            recoverable: true,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Internal,
            message: msg.into(),
            recoverable: false,
        }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Storage,
            message: msg.into(),
            recoverable: false,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for AppError {}
