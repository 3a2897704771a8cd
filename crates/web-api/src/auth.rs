//! JWT 身份校验模块
//!
//! 令牌由外部认证服务签发，这里只负责验证并解析出调用者身份。
//! `generate_token` 供集成测试和运维工具使用同一密钥铸造令牌。

use axum::http::{header, HeaderMap};
use config::JwtConfig;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

/// JWT Claims 结构
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Uuid,
    /// 过期时间 (Unix timestamp)
    pub exp: i64,
}

/// JWT Token 服务
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_ref());
        let decoding_key = DecodingKey::from_secret(config.secret.as_ref());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// 生成 JWT token
    pub fn generate_token(&self, user_id: Uuid) -> Result<String, ApiError> {
        let now = chrono::Utc::now();
        let exp = now + chrono::Duration::hours(self.config.expiration_hours);

        let claims = Claims {
            user_id,
            exp: exp.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| ApiError::internal_server_error(format!("token encoding failed: {err}")))
    }

    /// 验证 JWT token 并返回 claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|err| {
                tracing::warn!(error = %err, "无效的访问令牌");
                ApiError::unauthorized("invalid or expired token")
            })
    }

    /// 从请求头解析调用者身份（`Authorization: Bearer <token>`）
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Uuid, ApiError> {
        let header_value = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("missing authorization header"))?;

        let token = header_value
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthorized("malformed authorization header"))?;

        Ok(self.validate_token(token)?.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_service() -> JwtService {
        JwtService::new(JwtConfig {
            secret: "test-secret-key-with-at-least-32-characters".to_string(),
            expiration_hours: 1,
        })
    }

    #[test]
    fn test_token_round_trip() {
        let service = make_service();
        let user_id = Uuid::new_v4();

        let token = service.generate_token(user_id).unwrap();
        let claims = service.validate_token(&token).unwrap();
        assert_eq!(claims.user_id, user_id);
    }

    #[test]
    fn test_invalid_token_is_rejected() {
        let service = make_service();
        assert!(service.validate_token("not-a-token").is_err());
    }

    #[test]
    fn test_authenticate_from_headers() {
        let service = make_service();
        let user_id = Uuid::new_v4();
        let token = service.generate_token(user_id).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            format!("Bearer {token}").parse().unwrap(),
        );
        assert_eq!(service.authenticate(&headers).unwrap(), user_id);

        // 缺失或格式错误的头都被拒绝
        assert!(service.authenticate(&HeaderMap::new()).is_err());
        let mut bad = HeaderMap::new();
        bad.insert(header::AUTHORIZATION, token.parse().unwrap());
        assert!(service.authenticate(&bad).is_err());
    }
}
