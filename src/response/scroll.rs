use serde::{Deserialize, Serialize};

use crate::{error::Result, response::FromResponse};

/// Scroll pages themselves are plain [`SearchResponse`](crate::response::SearchResponse)s
/// carrying a `scroll_id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClearScrollResponse {
    #[serde(default = "succeeded_by_default")]
    pub succeeded: bool,
    pub num_freed: Option<u32>,
}

fn succeeded_by_default() -> bool {
    true
}

impl FromResponse for ClearScrollResponse {
    fn from_body(body: &[u8]) -> Result<Self> {
        // older servers answer with an empty body
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(ClearScrollResponse {
                succeeded: true,
                num_freed: None,
            });
        }
        Ok(serde_json::from_slice(body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_clear_scroll() {
        let resp = ClearScrollResponse::from_body(br#"{"succeeded": true, "num_freed": 3}"#).unwrap();
        assert!(resp.succeeded);
        assert_eq!(resp.num_freed, Some(3));

        let resp = ClearScrollResponse::from_body(b"{}").unwrap();
        assert!(resp.succeeded);
        assert!(resp.num_freed.is_none());

        assert!(ClearScrollResponse::from_body(b"").unwrap().succeeded);
    }
}
