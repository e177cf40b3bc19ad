use anyhow::Result;
use colored::*;
use serde_json::json;
use std::time::{Duration, Instant};

use crate::api_client::ApiClient;
use crate::output::{print_event, TestResult};
use crate::sse_client::Connection;

const EVENT_WAIT: Duration = Duration::from_secs(5);

/// Connect and expect the `connected` handshake frame.
pub async fn test_connection(sse: &mut Connection) -> Result<TestResult> {
    let start = Instant::now();

    println!("\n{}", "=== TEST: Connection ===".bright_cyan().bold());
    println!("{} Waiting for connected event...", "→".blue());

    match sse.wait_for_event("connected", EVENT_WAIT).await {
        Ok(event) => {
            print_event(&sse.label, &event);
            let passed = event.data["session_id"].is_string();
            Ok(TestResult {
                scenario: "connection".to_string(),
                passed,
                message: (!passed).then(|| "connected frame carried no session_id".to_string()),
                duration: start.elapsed(),
            })
        }
        Err(e) => Ok(TestResult {
            scenario: "connection".to_string(),
            passed: false,
            message: Some(e.to_string()),
            duration: start.elapsed(),
        }),
    }
}

/// Expect the periodic timestamp liveness frame within its interval.
pub async fn test_timestamp(sse: &mut Connection, message_interval: Duration) -> Result<TestResult> {
    let start = Instant::now();

    println!("\n{}", "=== TEST: Timestamp ===".bright_cyan().bold());
    println!("{} Waiting for timestamp event...", "→".blue());

    match sse
        .wait_for_event("timestamp", message_interval + EVENT_WAIT)
        .await
    {
        Ok(event) => {
            print_event(&sse.label, &event);
            let passed = event.data["counter"].is_u64();
            Ok(TestResult {
                scenario: "timestamp".to_string(),
                passed,
                message: (!passed).then(|| "timestamp frame carried no counter".to_string()),
                duration: start.elapsed(),
            })
        }
        Err(e) => Ok(TestResult {
            scenario: "timestamp".to_string(),
            passed: false,
            message: Some(e.to_string()),
            duration: start.elapsed(),
        }),
    }
}

/// Publish one product change and expect it back on the stream.
pub async fn test_product_update(
    api_client: &ApiClient,
    sse: &mut Connection,
) -> Result<TestResult> {
    let start = Instant::now();

    println!("\n{}", "=== TEST: Product Update ===".bright_cyan().bold());

    let product = json!({"id": 42, "sku": "CAT-42", "price": "19.99"});
    println!("{} Publishing product.updated...", "→".blue());
    let entry_id = api_client
        .publish_product_event("product.updated", product)
        .await?;
    println!("{} Event appended (entry ID: {})", "✓".green(), entry_id);

    match sse.wait_for_event("product.updated", EVENT_WAIT).await {
        Ok(event) => {
            print_event(&sse.label, &event);

            if event.data["id"] == 42 && event.data["price"] == "19.99" {
                println!("{} Event data verified correctly", "✓".green());
                Ok(TestResult {
                    scenario: "product_update".to_string(),
                    passed: true,
                    message: None,
                    duration: start.elapsed(),
                })
            } else {
                println!("{} Event data mismatch!", "✗".red());
                Ok(TestResult {
                    scenario: "product_update".to_string(),
                    passed: false,
                    message: Some(format!("Unexpected payload: {}", event.data)),
                    duration: start.elapsed(),
                })
            }
        }
        Err(e) => Ok(TestResult {
            scenario: "product_update".to_string(),
            passed: false,
            message: Some(e.to_string()),
            duration: start.elapsed(),
        }),
    }
}

/// Publish a burst of creates and verify arrival order matches append order.
pub async fn test_ordering(api_client: &ApiClient, sse: &mut Connection) -> Result<TestResult> {
    let start = Instant::now();
    let count: i64 = 5;

    println!("\n{}", "=== TEST: Ordering ===".bright_cyan().bold());
    println!("{} Publishing {} product.created events...", "→".blue(), count);

    for n in 0..count {
        api_client
            .publish_product_event("product.created", json!({"id": n, "sku": format!("ORD-{n}")}))
            .await?;
    }

    let mut received = Vec::new();
    for _ in 0..count {
        match sse.wait_for_event("product.created", EVENT_WAIT).await {
            Ok(event) => received.push(event.data["id"].as_i64().unwrap_or(-1)),
            Err(e) => {
                return Ok(TestResult {
                    scenario: "ordering".to_string(),
                    passed: false,
                    message: Some(e.to_string()),
                    duration: start.elapsed(),
                })
            }
        }
    }

    let expected: Vec<i64> = (0..count).collect();
    let passed = received == expected;
    if passed {
        println!("{} All {} events arrived in append order", "✓".green(), count);
    } else {
        println!("{} Order mismatch: {:?}", "✗".red(), received);
    }

    Ok(TestResult {
        scenario: "ordering".to_string(),
        passed,
        message: (!passed).then(|| format!("expected {:?}, got {:?}", expected, received)),
        duration: start.elapsed(),
    })
}
