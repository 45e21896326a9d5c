use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;

use crate::domain::error::AppError;
use crate::domain::run::JobRequest;
use crate::domain::settings::InputLimits;
use crate::domain::types::InboundFile;

/// 拡張子とサイズを検証する。リモート呼び出しの前に必ず通す。
pub fn validate_input(file: &InboundFile, limits: &InputLimits) -> Result<(), AppError> {
    let extension = file
        .file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    if !limits.allowed_extensions.iter().any(|e| *e == extension) {
        let allowed = limits
            .allowed_extensions
            .iter()
            .map(|e| format!(".{e}"))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(AppError::input_rejected(format!(
            "Adjunta un archivo con extensión {allowed} (envíalo como documento)."
        )));
    }

    if file.bytes.len() > limits.max_file_bytes {
        return Err(AppError::input_rejected(format!(
            "Archivo demasiado grande ({} bytes, máx {} bytes).",
            file.bytes.len(),
            limits.max_file_bytes
        )));
    }

    Ok(())
}

/// ファイル内容を base64 化して投入リクエストを組み立てる
pub fn build_request(file: &InboundFile, job_id: i64, payload_param: &str) -> JobRequest {
    JobRequest {
        job_id,
        file_name: file.file_name.clone(),
        payload_b64: BASE64_STANDARD.encode(&file.bytes),
        payload_param: payload_param.to_string(),
    }
}

/// ノートブックパラメータ（ペイロード + ファイル名）
pub fn notebook_params(request: &JobRequest) -> serde_json::Value {
    let mut params = serde_json::Map::new();
    params.insert(
        request.payload_param.clone(),
        serde_json::Value::String(request.payload_b64.clone()),
    );
    params.insert(
        "file_name".to_string(),
        serde_json::Value::String(request.file_name.clone()),
    );
    serde_json::Value::Object(params)
}
