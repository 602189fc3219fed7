//! Client for the chat and feedback workflow webhooks.

use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::GatewayError;

const FEEDBACK_SAMPLE_ROWS: usize = 3;

pub struct Webhook {
    client: reqwest::Client,
    chat_url: String,
    feedback_url: String,
    timeout: Duration,
}

impl Webhook {
    pub fn new(
        chat_url: String,
        feedback_url: String,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("RappiInsights-Gateway/1.0")
            .build()?;
        Ok(Self {
            client,
            chat_url,
            feedback_url,
            timeout,
        })
    }

    pub fn chat_url(&self) -> &str {
        &self.chat_url
    }

    /// Forward a question and return the normalized reply
    pub async fn ask(&self, payload: &Value) -> Result<Value, GatewayError> {
        let response = self.post(&self.chat_url, payload).await?;
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(e))?;
        let reply: Value = serde_json::from_str(&body)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        normalize_reply(reply)
    }

    /// Forward feedback; any 2xx counts as delivered
    pub async fn feedback(&self, payload: &Value) -> Result<(), GatewayError> {
        self.post(&self.feedback_url, payload).await?;
        Ok(())
    }

    async fn post(&self, url: &str, payload: &Value) -> Result<reqwest::Response, GatewayError> {
        debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("webhook {} returned {}", url, status);
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }
        Ok(response)
    }

    fn transport_error(&self, e: reqwest::Error) -> GatewayError {
        if e.is_timeout() {
            GatewayError::Timeout(self.timeout.as_secs())
        } else {
            GatewayError::Unreachable(e.to_string())
        }
    }
}

/// Unwrap each result row from its `json` envelope and fill in `row_count`
pub fn normalize_reply(mut reply: Value) -> Result<Value, GatewayError> {
    let Some(object) = reply.as_object_mut() else {
        return Err(GatewayError::InvalidResponse(
            "expected a JSON object".to_string(),
        ));
    };

    if let Some(Value::Array(results)) = object.get_mut("results") {
        for item in results.iter_mut() {
            if let Some(inner) = item.get_mut("json").map(Value::take) {
                *item = inner;
            }
        }
        let len = results.len();
        object.entry("row_count").or_insert_with(|| json!(len));
    }

    Ok(reply)
}

/// Body sent to the chat webhook
pub fn chat_payload(question: &str, session_id: &str, user_context: Option<&str>) -> Value {
    json!({
        "chatInput": question,
        "sessionId": session_id,
        "user_context": user_context,
    })
}

/// Body sent to the feedback webhook: only the first rows travel along
pub fn feedback_payload(
    feedback: &str,
    user_id: &str,
    question: &str,
    sql_query: Option<&str>,
    results: &[Value],
    timestamp: &str,
) -> Value {
    let sample: Vec<&Value> = results.iter().take(FEEDBACK_SAMPLE_ROWS).collect();
    json!({
        "feedback": feedback,
        "user_id": user_id,
        "question": question,
        "sql_query": sql_query,
        "results": sample,
        "timestamp": timestamp,
        "row_count": results.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwraps_json_envelope() {
        let reply = json!({
            "success": true,
            "results": [{"json": {"zone": "Polanco"}}, {"zone": "Chapinero"}]
        });
        let normalized = normalize_reply(reply).unwrap();
        assert_eq!(
            normalized["results"],
            json!([{"zone": "Polanco"}, {"zone": "Chapinero"}])
        );
        assert_eq!(normalized["row_count"], 2);
    }

    #[test]
    fn test_keeps_existing_row_count() {
        let reply = json!({ "success": true, "results": [{"a": 1}], "row_count": 40 });
        let normalized = normalize_reply(reply).unwrap();
        assert_eq!(normalized["row_count"], 40);
    }

    #[test]
    fn test_reply_without_results_unchanged() {
        let reply = json!({ "success": false, "error": "no SQL generated" });
        let normalized = normalize_reply(reply.clone()).unwrap();
        assert_eq!(normalized, reply);
    }

    #[test]
    fn test_non_object_reply_rejected() {
        let err = normalize_reply(json!([1, 2])).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidResponse(_)));
    }

    #[test]
    fn test_chat_payload_fields() {
        let payload = chat_payload("Top zones?", "user_1", None);
        assert_eq!(payload["chatInput"], "Top zones?");
        assert_eq!(payload["sessionId"], "user_1");
        assert!(payload["user_context"].is_null());
    }

    #[test]
    fn test_feedback_payload_truncates_results() {
        let results: Vec<Value> = (0..5).map(|i| json!({ "row": i })).collect();
        let payload = feedback_payload("positivo", "u", "q", Some("SELECT 1"), &results, "t");
        assert_eq!(payload["results"].as_array().unwrap().len(), 3);
        assert_eq!(payload["results"][2], json!({ "row": 2 }));
        assert_eq!(payload["row_count"], 5);
        assert_eq!(payload["sql_query"], "SELECT 1");
    }
}
