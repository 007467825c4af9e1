//! Delivery integration tests
//!
//! Drive subscriptions through the public API: selector compilation via the
//! shared cache, filtering over data fields and JSON payloads, credit and
//! cumulative acknowledgement.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use vibemq_delivery::config::Config;
use vibemq_delivery::delivery::{AckMode, CreditHandler, Delivery, SubscriptionBuilder};
use vibemq_delivery::message::{Message, QoS};
use vibemq_delivery::selector::{SelectorCache, Value};

fn reading(id: u64, temperature: i64, humidity: Option<i64>) -> Message {
    let mut builder = Message::builder(id)
        .qos(QoS::AtLeastOnce)
        .data("temperature", temperature);
    if let Some(humidity) = humidity {
        builder = builder.data("humidity", humidity);
    }
    builder.build()
}

#[test]
fn test_selector_filters_messages() {
    let cache = SelectorCache::default();
    let sub = SubscriptionBuilder::new("sensors")
        .selector("temperature > 20 AND humidity IS NOT NULL")
        .build(&cache)
        .unwrap();

    let a = reading(1, 25, Some(40));
    let b = reading(2, 25, None);
    let c = reading(3, 10, Some(40));

    assert_eq!(sub.offer(&a), Delivery::Deliver);
    assert_eq!(sub.offer(&b), Delivery::Filtered);
    assert_eq!(sub.offer(&c), Delivery::Filtered);

    let stats = sub.stats();
    assert_eq!(stats.sent, 1);
    assert_eq!(stats.filtered, 2);
    assert_eq!(stats.outstanding, 1);
}

#[test]
fn test_json_payload_selection() {
    let cache = SelectorCache::default();
    let sub = SubscriptionBuilder::new("hot")
        .selector("PARSER('json', 'reading.celsius') > 40 AND site = 'north'")
        .build(&cache)
        .unwrap();

    let hot = Message::builder(1)
        .json_payload(r#"{"site":"north","reading":{"celsius":42.5}}"#)
        .build();
    let cold = Message::builder(2)
        .json_payload(r#"{"site":"north","reading":{"celsius":12}}"#)
        .build();
    let opaque = Message::builder(3).payload("not json").build();

    assert!(sub.matches(&hot));
    assert!(!sub.matches(&cold));
    assert!(!sub.matches(&opaque));
}

#[test]
fn test_equal_selectors_share_compiled_tree() {
    let cache = SelectorCache::default();
    let first = SubscriptionBuilder::new("a")
        .selector("x = 1 AND y > 2")
        .build(&cache)
        .unwrap();
    let second = SubscriptionBuilder::new("b")
        .selector("y > 2 and x = 1")
        .build(&cache)
        .unwrap();

    let (Some(lhs), Some(rhs)) = (first.selector(), second.selector()) else {
        panic!("both subscriptions should filter");
    };
    assert!(Arc::ptr_eq(lhs, rhs));
    assert_eq!(cache.len(), 1);

    drop(first);
    drop(second);
    assert_eq!(cache.len(), 0);
    assert!(cache.purge() > 0);
}

#[test]
fn test_client_and_destination_selectors_combine() {
    let cache = SelectorCache::default();
    let sub = SubscriptionBuilder::new("combined")
        .selector("temperature > 20")
        .destination_selector("humidity < 50")
        .build(&cache)
        .unwrap();

    assert!(sub.matches(&reading(1, 25, Some(40))));
    assert!(!sub.matches(&reading(2, 25, Some(60))));
    assert!(!sub.matches(&reading(3, 15, Some(40))));
}

#[test]
fn test_invalid_selector_rejects_subscription() {
    let cache = SelectorCache::default();
    let err = SubscriptionBuilder::new("bad")
        .selector("temperature >")
        .build(&cache)
        .unwrap_err();
    assert!(err.position().is_some());
    assert!(cache.is_empty());
}

#[test]
fn test_always_true_selector_is_dropped() {
    let cache = SelectorCache::default();
    let sub = SubscriptionBuilder::new("all")
        .selector("1 = 1 OR missing > 3")
        .build(&cache)
        .unwrap();
    assert!(sub.selector().is_none());
    assert!(sub.matches(&Message::builder(1).build()));
}

#[test]
fn test_credit_window_with_cumulative_ack() {
    let cache = SelectorCache::default();
    let sub = SubscriptionBuilder::new("window")
        .ack_mode(AckMode::Cumulative)
        .credit_handler(CreditHandler::Fixed)
        .receive_maximum(3)
        .build(&cache)
        .unwrap();

    for id in 1..=3 {
        assert_eq!(sub.offer(&reading(id, 0, None)), Delivery::Deliver);
    }
    assert_eq!(sub.offer(&reading(4, 0, None)), Delivery::NoCredit);

    // Acking the second message completes the first two
    assert_eq!(sub.ack_received(2), 2);
    assert_eq!(sub.offer(&reading(4, 0, None)), Delivery::Deliver);
    assert_eq!(
        sub.outstanding()
            .iter()
            .map(|entry| entry.message_id)
            .collect::<Vec<_>>(),
        vec![3, 4]
    );

    assert_eq!(sub.rollback_received(4), 2);
    let stats = sub.stats();
    assert_eq!(stats.acked, 2);
    assert_eq!(stats.rolled_back, 2);
    assert_eq!(stats.outstanding, 0);
}

#[test]
fn test_client_credit_replenished_explicitly() {
    let cache = SelectorCache::default();
    let sub = SubscriptionBuilder::new("client")
        .credit_handler(CreditHandler::Client)
        .receive_maximum(1)
        .build(&cache)
        .unwrap();

    assert_eq!(sub.offer(&reading(1, 0, None)), Delivery::Deliver);
    assert_eq!(sub.offer(&reading(2, 0, None)), Delivery::NoCredit);
    sub.ack_received(1);
    assert_eq!(sub.offer(&reading(2, 0, None)), Delivery::NoCredit);

    assert!(sub.update_credit(2));
    assert_eq!(sub.offer(&reading(2, 0, None)), Delivery::Deliver);
}

#[test]
fn test_subscription_from_config() {
    let config = Config::parse(
        r#"
[selector]
extensions = []

[delivery]
receive_maximum = 2
ack_mode = "individual"
"#,
    )
    .unwrap();

    let cache = SelectorCache::from_config(&config.selector).unwrap();
    assert!(SubscriptionBuilder::new("x")
        .selector("PARSER('json', 'a') = 1")
        .build(&cache)
        .is_err());

    let sub = SubscriptionBuilder::from_config("y", &config.delivery)
        .selector("kind = 'alert'")
        .build(&cache)
        .unwrap();
    assert_eq!(sub.controller().mode(), AckMode::Individual);

    let alert = |id| {
        Message::builder(id)
            .qos(QoS::AtLeastOnce)
            .data("kind", Value::from("alert"))
            .build()
    };
    assert_eq!(sub.offer(&alert(1)), Delivery::Deliver);
    assert_eq!(sub.offer(&alert(2)), Delivery::Deliver);
    assert_eq!(sub.offer(&alert(3)), Delivery::NoCredit);

    // Individual mode only completes the exact id
    assert_eq!(sub.ack_received(2), 1);
    assert_eq!(sub.outstanding()[0].message_id, 1);
}
