use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::ApiError;
use crate::services::AppState;

// OTP-specific rate limits
const OTP_RATE_LIMIT: u32 = 10; // 10 attempts per 5 minutes
const OTP_RATE_WINDOW_SECONDS: u64 = 300; // 5 minutes

fn extract_client_ip_from(headers: &HeaderMap, extensions: &axum::http::Extensions) -> String {
    // Preferred order: X-Forwarded-For, Forwarded, X-Real-IP, ConnectInfo
    if let Some(v) = headers.get("x-forwarded-for") {
        if let Ok(s) = v.to_str() {
            // x-forwarded-for can be a comma separated list; take first
            return s.split(',').next().unwrap_or(s).trim().to_string();
        }
    }

    if let Some(v) = headers.get("forwarded") {
        if let Ok(s) = v.to_str() {
            // forwarded: for=1.2.3.4; proto=http; by=...
            for part in s.split(';') {
                let p = part.trim();
                if p.starts_with("for=") {
                    let val = p.trim_start_matches("for=").trim().trim_matches('\"');
                    return val.to_string();
                }
            }
        }
    }

    if let Some(v) = headers.get("x-real-ip") {
        if let Ok(s) = v.to_str() {
            return s.trim().to_string();
        }
    }

    // Fall back to ConnectInfo socket address if available
    if let Some(ci) = extensions.get::<ConnectInfo<SocketAddr>>() {
        return ci.0.ip().to_string();
    }

    "unknown".to_string()
}

/// Rate limit middleware for the OTP endpoints
/// Allows 10 attempts per 5 minutes per IP
pub async fn otp_rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // Allow disabling rate limits in local perf runs by setting RATE_LIMIT_DISABLED=1
    let rate_limit_disabled = std::env::var("RATE_LIMIT_DISABLED").unwrap_or_default() == "1";

    if !rate_limit_disabled {
        let headers = request.headers();
        let extensions = request.extensions();
        let client_ip = extract_client_ip_from(headers, extensions);

        // Allow overriding the OTP limit via env RATE_LIMIT_OTP_ATTEMPTS
        let otp_limit = std::env::var("RATE_LIMIT_OTP_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(OTP_RATE_LIMIT);

        let count = state
            .cache
            .incr_window(
                &format!("ratelimit:otp:{}", client_ip),
                OTP_RATE_WINDOW_SECONDS,
            )
            .await
            .map_err(|e| {
                tracing::error!("OTP rate limit check failed: {}", e);
                ApiError::internal("Rate limit check failed")
            })?;

        if count > otp_limit as i64 {
            tracing::warn!("OTP rate limit exceeded for IP: {}", client_ip);
            return Err(ApiError::too_many_requests(
                "Too many attempts. Please try again later.",
            ));
        }
    } else {
        tracing::debug!("Rate limiting disabled via RATE_LIMIT_DISABLED=1");
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ConnectInfo;
    use axum::http::HeaderMap;
    use std::net::SocketAddr;

    #[test]
    fn test_extract_client_ip_x_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "1.2.3.4".parse().unwrap());
        let exts = axum::http::Extensions::new();
        assert_eq!(
            extract_client_ip_from(&headers, &exts),
            "1.2.3.4".to_string()
        );
    }

    #[test]
    fn test_extract_client_ip_x_forwarded_for_list() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "1.2.3.4, 10.0.0.1".parse().unwrap());
        let exts = axum::http::Extensions::new();
        assert_eq!(
            extract_client_ip_from(&headers, &exts),
            "1.2.3.4".to_string()
        );
    }

    #[test]
    fn test_extract_client_ip_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert("forwarded", "for=5.6.7.8;proto=http".parse().unwrap());
        let exts = axum::http::Extensions::new();
        assert_eq!(
            extract_client_ip_from(&headers, &exts),
            "5.6.7.8".to_string()
        );
    }

    #[test]
    fn test_extract_client_ip_x_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "9.9.9.9".parse().unwrap());
        let exts = axum::http::Extensions::new();
        assert_eq!(
            extract_client_ip_from(&headers, &exts),
            "9.9.9.9".to_string()
        );
    }

    #[test]
    fn test_extract_client_ip_connectinfo() {
        let headers = HeaderMap::new();
        let mut exts = axum::http::Extensions::new();
        exts.insert(ConnectInfo::<SocketAddr>("7.7.7.7:1234".parse().unwrap()));
        assert_eq!(
            extract_client_ip_from(&headers, &exts),
            "7.7.7.7".to_string()
        );
    }
}
