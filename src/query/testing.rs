//! Shared test doubles for component unit tests.

use std::collections::HashMap;

use serde_json::Value;
use uuid::Uuid;

use crate::continuation::codec::{CompositeContinuation, RangeContinuation};
use crate::types::feed::FeedResponse;

use super::component::{DrainFuture, QueryComponent};

/// A component replaying scripted pages. Every page except the last
/// carries a continuation, mirroring a live base context.
pub struct ScriptedComponent {
    pages: std::vec::IntoIter<Vec<Value>>,
    remaining: usize,
}

impl ScriptedComponent {
    pub fn new(pages: Vec<Vec<Value>>) -> Self {
        let remaining = pages.len();
        Self {
            pages: pages.into_iter(),
            remaining,
        }
    }
}

impl QueryComponent for ScriptedComponent {
    fn drain(&mut self, _max_page_size: usize) -> DrainFuture<'_> {
        let page = self.pages.next();
        if page.is_some() {
            self.remaining -= 1;
        }
        let continuation = (self.remaining > 0).then(|| {
            CompositeContinuation::new(
                "test-collection",
                vec![RangeContinuation {
                    min: String::new(),
                    max: "FF".to_string(),
                    token: Some("t".to_string()),
                    order: None,
                }],
            )
        });
        Box::pin(async move {
            Ok(page.map(|items| FeedResponse {
                items,
                continuation,
                request_charge: 1.0,
                query_metrics: HashMap::new(),
                activity_id: Uuid::nil(),
            }))
        })
    }
}

/// Boxes a scripted component.
pub fn pages_component(pages: Vec<Vec<Value>>) -> Box<dyn QueryComponent> {
    Box::new(ScriptedComponent::new(pages))
}
