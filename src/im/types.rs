use crate::im::room_info::error::{RoomInfoError, RoomInfoResult};
use serde::Deserialize;
use tracing::{debug, error, info};

/// 统一的 REST 响应包装结构体（包含 success、error、errorType，其余字段为业务数据）
/// 业务数据字段名因接口而异（room / user / visitor），因此使用 flatten
#[derive(Debug, Deserialize)]
pub struct RestResponse<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(rename = "errorType", default)]
    pub error_type: Option<String>,
    #[serde(flatten)]
    pub data: Option<T>,
}

/// 只取错误信息的响应体
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(rename = "errorType", default)]
    error_type: Option<String>,
}

/// 根据错误类型字符串判断错误类别
fn classify_error_type(error_type: &str, message: String) -> Option<RoomInfoError> {
    let t = error_type.to_ascii_lowercase();
    if t.contains("not-found") || t.contains("invalid-user") || t.contains("invalid-room") {
        Some(RoomInfoError::NotFound(message))
    } else if t.contains("not-allowed") || t.contains("unauthorized") || t.contains("forbidden") {
        Some(RoomInfoError::Unauthorized(message))
    } else {
        None
    }
}

/// 把失败的 HTTP 响应映射为领域错误
pub fn classify_http_error(status: u16, body: &str) -> RoomInfoError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .error
        .clone()
        .unwrap_or_else(|| format!("HTTP 错误 {}: {}", status, body));

    match status {
        401 | 403 => RoomInfoError::Unauthorized(message),
        404 => RoomInfoError::NotFound(message),
        408 | 429 | 500..=599 => RoomInfoError::Transient(message),
        _ => parsed
            .error_type
            .as_deref()
            .and_then(|t| classify_error_type(t, message.clone()))
            .unwrap_or(RoomInfoError::Malformed(message)),
    }
}

/// 解析响应体：检查 success 标记并取出业务数据
pub fn parse_rest_body<T: serde::de::DeserializeOwned>(
    body: &[u8],
    operation_name: &str,
) -> RoomInfoResult<T> {
    let body_str = String::from_utf8_lossy(body);
    let resp: RestResponse<T> = serde_json::from_slice(body).map_err(|e| {
        error!(
            "[HTTP] {}反序列化失败: {:?}\n原始响应: {}",
            operation_name, e, body_str
        );
        RoomInfoError::Malformed(format!("反序列化响应失败: {}", e))
    })?;

    if !resp.success {
        let message = resp
            .error
            .clone()
            .unwrap_or_else(|| format!("{}返回 success=false", operation_name));
        error!(
            "[HTTP] {}服务器错误，错误类型: {:?}, 错误信息: {}",
            operation_name, resp.error_type, message
        );
        return Err(resp
            .error_type
            .as_deref()
            .and_then(|t| classify_error_type(t, message.clone()))
            .unwrap_or(RoomInfoError::Malformed(message)));
    }

    resp.data
        .ok_or_else(|| RoomInfoError::Malformed(format!("{}响应中缺少业务数据", operation_name)))
}

/// 通用 HTTP 响应处理函数：检查状态码、记录响应体并反序列化为业务数据
/// 所有房间信息 API 都共用此方法
pub async fn handle_rest_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    operation_name: &str,
) -> RoomInfoResult<T> {
    let status = response.status();

    // 读取 body bytes（只能读取一次）
    let body_bytes = response.bytes().await?;
    let body_str = String::from_utf8_lossy(&body_bytes);
    info!("[HTTP] {}响应 Body: {}", operation_name, body_str);

    if !status.is_success() {
        error!(
            "[HTTP] {}请求失败，HTTP状态: {}, 响应: {}",
            operation_name, status, body_str
        );
        return Err(classify_http_error(status.as_u16(), &body_str));
    }
    debug!("[HTTP] {}请求成功，HTTP状态: {}", operation_name, status);

    parse_rest_body(&body_bytes, operation_name)
}
