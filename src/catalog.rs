//! Built-in services
//!
//! A small notebook domain used by the CLI and the integration tests:
//!
//! | name               | kind    | what it does                                 |
//! |--------------------|---------|----------------------------------------------|
//! | `skip_feature`     | trait   | `page`/`limit` paging, derives `skip`        |
//! | `order_by_feature` | trait   | `order_by` checked against `available_order_by` |
//! | `note_client`      | service | checks the API token, yields a client handle |
//! | `note_list`        | service | searches the in-memory notebook              |
//! | `note_digest`      | service | one `note_list` child per query (batch)      |

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use crate::deps::{Args, Dep};
use crate::error::Result;
use crate::fragment::{Callback, Fragment, Loader, ServiceDescriptor};
use crate::registry::ServiceRegistry;

/// Orders accepted by `note_list`
pub const ORDER_BY_OPTIONS: [&str; 6] = [
    "created asc",
    "created desc",
    "updated asc",
    "updated desc",
    "title asc",
    "relevance desc",
];

/// Notifications produced by after-commit callbacks
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    messages: Arc<Mutex<Vec<String>>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, message: impl Into<String>) {
        self.messages.lock().push(message.into());
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Serialize)]
struct Note {
    id: u32,
    title: &'static str,
    body: &'static str,
    created: u32,
    updated: u32,
}

static NOTEBOOK: Lazy<Vec<Note>> = Lazy::new(|| {
    let note = |id, title, body, created, updated| Note {
        id,
        title,
        body,
        created,
        updated,
    };
    vec![
        note(1, "Grocery list", "milk, eggs, rice", 100, 180),
        note(2, "Rust ownership", "borrowing rules and lifetimes", 110, 240),
        note(3, "Trip to Busan", "train at 9, seafood market", 120, 130),
        note(4, "Meeting notes", "roadmap review, rust migration", 130, 260),
        note(5, "Book ideas", "a novel about a lighthouse", 140, 150),
        note(6, "Workout plan", "run, rest, lift", 150, 210),
    ]
});

/// Integer from a number or a numeric string
fn int(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

fn set_field(target: &mut Value, field: &str, value: Value) {
    if let Some(fields) = target.as_object_mut() {
        fields.insert(field.to_string(), value);
    }
}

fn relevance(note: &Note, words: &[String]) -> usize {
    let text = format!("{} {}", note.title, note.body).to_lowercase();
    words.iter().filter(|w| text.contains(w.as_str())).count()
}

/// Search the notebook: every word must match title or body
fn find_notes(filter: &Value, skip: usize, limit: usize) -> Value {
    let words: Vec<String> = filter["words"]
        .as_str()
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_lowercase)
        .collect();

    let mut notes: Vec<&Note> = NOTEBOOK
        .iter()
        .filter(|note| relevance(note, &words) == words.len())
        .collect();

    let ascending = filter["ascending"].as_bool().unwrap_or(false);
    match filter["order"].as_str().unwrap_or("created") {
        "title" => notes.sort_by_key(|n| n.title),
        "updated" => notes.sort_by_key(|n| n.updated),
        "relevance" => notes.sort_by_key(|n| relevance(n, &words)),
        _ => notes.sort_by_key(|n| n.created),
    }
    if !ascending {
        notes.reverse();
    }

    json!(notes.into_iter().skip(skip).take(limit).collect::<Vec<_>>())
}

fn skip_feature() -> Fragment {
    Fragment::builder("skip_feature")
        .value("page", 1)
        .value("limit", 3)
        .loader(
            "skip",
            Loader::new(["page", "limit"], |args: &Args| {
                let page = int(args.value("page")).unwrap_or(1);
                let limit = int(args.value("limit")).unwrap_or(0);
                // saturates for pages far past the end
                let skip = page.checked_sub(1).and_then(|p| p.checked_mul(limit));
                json!(skip.unwrap_or(i64::MAX))
            }),
        )
        .rules("page", ["integer", "min:1"])
        .rules("limit", ["integer", "min:1", "max:20"])
        .bind_name("page", "page")
        .bind_name("limit", "limit")
        .bind_name("skip", "skip")
        .build()
}

fn order_by_feature() -> Fragment {
    Fragment::builder("order_by_feature")
        .rules("order_by", ["in_array:{{available_order_by}}.*"])
        .bind_name("order_by", "order by")
        .bind_name("available_order_by", "available {{order_by}} options")
        .build()
}

fn note_client() -> Fragment {
    Fragment::builder("note_client")
        .rules("token", ["required", "string", "min:8"])
        .bind_name("token", "api token")
        .loader(
            "result",
            Loader::new(["token"], |args: &Args| {
                let token = args.str("token").unwrap_or_default();
                let hint: String = token.chars().skip(token.chars().count().saturating_sub(4)).collect();
                json!({ "account": "demo", "token_hint": hint })
            }),
        )
        .build()
}

fn note_list(outbox: &Outbox) -> Fragment {
    let notify = outbox.clone();

    Fragment::builder("note_list")
        .with_trait("skip_feature")
        .with_trait("order_by_feature")
        .value("available_order_by", json!(ORDER_BY_OPTIONS))
        .value("order_by", "created desc")
        .loader(
            "client",
            Loader::new(["token"], |args: &Args| {
                ServiceDescriptor::new("note_client").input("token", args.value("token").clone())
            }),
        )
        .loader(
            "filter",
            Loader::from_fn(|| json!({ "words": null, "order": "created", "ascending": false })),
        )
        .loader(
            "result",
            Loader::new(["client", "filter", "skip", "limit"], |args: &Args| {
                let skip = int(args.value("skip")).unwrap_or(0).max(0) as usize;
                let limit = int(args.value("limit")).unwrap_or(0).max(0) as usize;
                find_notes(args.value("filter"), skip, limit)
            }),
        )
        .callback(
            "filter.order",
            Callback::on_value(["filter", "orderBy"], |args: &Args, filter: &mut Value| {
                let order = args
                    .str("order_by")
                    .and_then(|o| o.split(' ').next())
                    .unwrap_or("created");
                set_field(filter, "order", json!(order));
            }),
        )
        .callback(
            "filter.ascending",
            Callback::on_value(["filter", "orderBy"], |args: &Args, filter: &mut Value| {
                let direction = args.str("order_by").and_then(|o| o.split(' ').nth(1));
                set_field(filter, "ascending", json!(direction == Some("asc")));
            }),
        )
        .callback(
            "filter.words",
            Callback::on_value(
                [Dep::new("filter"), Dep::with_default("words", Value::Null)],
                |args: &Args, filter: &mut Value| {
                    set_field(filter, "words", args.value("words").clone());
                },
            ),
        )
        .callback(
            "filter.trace",
            Callback::new(["filter"], |args: &Args| {
                info!(filter = %args.value("filter"), "note filter ready");
            }),
        )
        .callback(
            "result.notify:after_commit",
            Callback::new(["result", "filter"], move |args: &Args| {
                let count = args.value("result").as_array().map_or(0, Vec::len);
                let words = args.value("filter")["words"].as_str().unwrap_or("*").to_string();
                notify.push(format!("listed {} notes for '{}'", count, words));
            }),
        )
        .rules("token", ["required", "string"])
        .rules("order_by", ["string"])
        .rules("words", ["nullable", "string", "max:50"])
        .bind_name("token", "api token")
        .bind_name("words", "search words")
        .build()
}

fn note_digest(outbox: &Outbox) -> Fragment {
    let notify = outbox.clone();

    Fragment::builder("note_digest")
        .loader(
            "lists",
            Loader::new(["queries", "token"], |args: &Args| {
                let token = args.value("token").clone();
                args.value("queries")
                    .as_array()
                    .map(|queries| {
                        queries
                            .iter()
                            .map(|words| {
                                ServiceDescriptor::new("note_list")
                                    .input("token", token.clone())
                                    .input("words", words.clone())
                                    .name("words", "{{queries}}")
                            })
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default()
            }),
        )
        .loader(
            "result",
            Loader::new(["queries", "lists"], |args: &Args| {
                json!({ "queries": args.value("queries"), "lists": args.value("lists") })
            }),
        )
        .callback(
            "result.notify:after_commit",
            Callback::new(["queries"], move |args: &Args| {
                let count = args.value("queries").as_array().map_or(0, Vec::len);
                notify.push(format!("digest of {} queries ready", count));
            }),
        )
        .promise("lists", ["token"])
        .rules("queries", ["required", "array", "min:1", "max:5"])
        .rules("queries.*", ["string"])
        .rules("token", ["required", "string"])
        .bind_name("queries", "digest queries")
        .bind_name("token", "api token")
        .build()
}

/// Registry with every built-in fragment
pub fn builtin_registry(outbox: &Outbox) -> Result<ServiceRegistry> {
    ServiceRegistry::new()
        .with(skip_feature())?
        .with(order_by_feature())?
        .with(note_client())?
        .with(note_list(outbox))?
        .with(note_digest(outbox))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::outcome::Outcome;

    fn ctx(outbox: &Outbox) -> Context {
        Context::builder(builtin_registry(outbox).unwrap())
            .locale("en")
            .build()
    }

    fn ids(value: &Value) -> Vec<i64> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|n| n["id"].as_i64().unwrap())
            .collect()
    }

    #[test]
    fn registry_contains_catalog() {
        let registry = builtin_registry(&Outbox::new()).unwrap();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            ["skip_feature", "order_by_feature", "note_client", "note_list", "note_digest"]
        );
        assert_eq!(
            registry.all_traits("note_list").unwrap(),
            ["skip_feature", "order_by_feature"]
        );
    }

    #[test]
    fn note_list_defaults() {
        let outbox = Outbox::new();
        let mut list = ctx(&outbox)
            .service(&ServiceDescriptor::new("note_list").input("token", "secret-token"))
            .unwrap();

        let outcome = list.run().unwrap();
        // newest first, first page of three
        assert_eq!(ids(outcome.result().unwrap()), [6, 5, 4]);
        assert!(list.child("client").is_some());
    }

    #[test]
    fn note_list_search_and_order() {
        let outbox = Outbox::new();
        let mut list = ctx(&outbox)
            .service(
                &ServiceDescriptor::new("note_list")
                    .input("token", "secret-token")
                    .input("words", "rust")
                    .input("order_by", "title asc"),
            )
            .unwrap();

        let outcome = list.run().unwrap();
        assert_eq!(ids(outcome.result().unwrap()), [4, 2]);
    }

    #[test]
    fn note_list_paging() {
        let outbox = Outbox::new();
        let mut list = ctx(&outbox)
            .service(
                &ServiceDescriptor::new("note_list")
                    .input("token", "secret-token")
                    .input("page", "2")
                    .input("limit", 2)
                    .input("order_by", "created asc"),
            )
            .unwrap();

        let outcome = list.run().unwrap();
        assert_eq!(ids(outcome.result().unwrap()), [3, 4]);
        assert_eq!(list.data()["skip"], json!(2));
    }

    #[test]
    fn huge_page_saturates_skip() {
        let outbox = Outbox::new();
        let mut list = ctx(&outbox)
            .service(
                &ServiceDescriptor::new("note_list")
                    .input("token", "secret-token")
                    .input("page", json!(i64::MAX))
                    .input("limit", 20),
            )
            .unwrap();

        let outcome = list.run().unwrap();
        assert_eq!(outcome.result(), Some(&json!([])));
        assert_eq!(list.data()["skip"], json!(i64::MAX));
    }

    #[test]
    fn filter_callbacks_configure_the_loaded_filter() {
        let outbox = Outbox::new();
        let mut list = ctx(&outbox)
            .service(
                &ServiceDescriptor::new("note_list")
                    .input("token", "secret-token")
                    .input("words", "rust")
                    .input("order_by", "updated asc"),
            )
            .unwrap();

        let outcome = list.run().unwrap();
        assert_eq!(
            list.data()["filter"],
            json!({ "words": "rust", "order": "updated", "ascending": true })
        );
        assert_eq!(ids(outcome.result().unwrap()), [2, 4]);
    }

    #[test]
    fn unknown_order_is_rejected_with_labels() {
        let outbox = Outbox::new();
        let mut list = ctx(&outbox)
            .service(
                &ServiceDescriptor::new("note_list")
                    .input("token", "secret-token")
                    .input("order_by", "size desc"),
            )
            .unwrap();

        let outcome = list.run().unwrap();
        assert_eq!(
            outcome.errors(),
            ["The order by field does not exist in available order by options."]
        );
    }

    #[test]
    fn short_token_fails_in_child() {
        let outbox = Outbox::new();
        let mut list = ctx(&outbox)
            .service(&ServiceDescriptor::new("note_list").input("token", "abc"))
            .unwrap();

        assert_eq!(
            list.run().unwrap(),
            Outcome::Errors(vec!["The api token must be at least 8 characters.".into()])
        );
    }

    #[test]
    fn digest_builds_batch_and_notifies_after_commit() {
        let outbox = Outbox::new();
        let mut digest = ctx(&outbox)
            .service(
                &ServiceDescriptor::new("note_digest")
                    .input("token", "secret-token")
                    .input("queries", json!(["rust", "trip"])),
            )
            .unwrap();

        let outcome = digest.run().unwrap();
        assert!(outcome.is_ok());
        assert_eq!(
            digest.children().keys().collect::<Vec<_>>(),
            ["lists.0", "lists.1"]
        );
        assert!(outbox.is_empty());

        digest.run_after_commit_callbacks().unwrap();
        assert_eq!(
            outbox.messages(),
            [
                "listed 2 notes for 'rust'",
                "listed 1 notes for 'trip'",
                "digest of 2 queries ready"
            ]
        );
    }
}
