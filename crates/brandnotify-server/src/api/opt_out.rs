use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Extension, Json,
};
use brandnotify_core::is_valid_email;
use serde::{Deserialize, Serialize};

use super::{map_db_error, ApiError, ApiResponse, AppState, ResponseMeta};
use crate::middleware::RequestId;

#[derive(Debug, Deserialize)]
pub(super) struct OptOutRequest {
    #[serde(default)]
    email: String,
}

#[derive(Debug, Serialize)]
struct OptOutData {
    success: bool,
    newly_added: bool,
    message: String,
}

/// Validates and normalizes an address, or returns the error to send back.
fn checked_email(req_id: &str, raw: &str) -> Result<String, ApiError> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(ApiError::new(req_id, "validation_error", "email is required"));
    }
    if !is_valid_email(&email) {
        return Err(ApiError::new(
            req_id,
            "validation_error",
            "email is not a valid address",
        ));
    }
    Ok(email)
}

pub(super) async fn opt_out_json(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<OptOutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = checked_email(&req_id.0, &body.email)?;

    let newly_added = brandnotify_db::add_opt_out(&state.pool, &email)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    tracing::info!(newly_added, "recorded opt-out");

    Ok(Json(ApiResponse {
        data: OptOutData {
            success: true,
            newly_added,
            message: format!("Email {email} has been opted out successfully"),
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// One-click unsubscribe target embedded in every notification email.
pub(super) async fn opt_out_link(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(params): Query<OptOutRequest>,
) -> Response {
    let email = match checked_email(&req_id.0, &params.email) {
        Ok(email) => email,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Html(render_page("Unsubscribe failed", &err.error.message)),
            )
                .into_response()
        }
    };

    match brandnotify_db::add_opt_out(&state.pool, &email).await {
        Ok(newly_added) => {
            tracing::info!(newly_added, "recorded opt-out from link");
            Html(render_page(
                "You have been unsubscribed",
                &format!("{email} will no longer receive brand report notifications."),
            ))
            .into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, request_id = %req_id.0, "opt-out link: database write failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(render_page(
                    "Unsubscribe failed",
                    "Something went wrong. Please try again later.",
                )),
            )
                .into_response()
        }
    }
}

fn render_page(title: &str, message: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{title}</title></head>\
         <body style=\"font-family:sans-serif;max-width:480px;margin:48px auto;text-align:center\">\
         <h1>{title}</h1><p>{message}</p></body></html>",
        title = escape_html(title),
        message = escape_html(message),
    )
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_email_normalizes_case_and_whitespace() {
        let email = checked_email("req", "  Press@Nike.Example ").expect("valid");
        assert_eq!(email, "press@nike.example");
    }

    #[test]
    fn checked_email_rejects_blank_and_malformed() {
        let blank = checked_email("req", "   ").expect_err("blank");
        assert_eq!(blank.error.message, "email is required");
        let malformed = checked_email("req", "nobody@").expect_err("malformed");
        assert_eq!(malformed.error.code, "validation_error");
    }

    #[test]
    fn render_page_escapes_markup() {
        let html = render_page("Done", "<script>alert('x')</script>");
        assert!(html.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;"));
        assert!(!html.contains("<script>"));
    }
}
