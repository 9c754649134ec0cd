use serde_derive::Deserialize;

/// B站接口通用响应结构
#[derive(Debug, Deserialize)]
pub struct CommonResponse<T> {
    pub code: i64,

    #[serde(default)]
    pub message: String,

    pub data: Option<T>,
}
