#![forbid(unsafe_code)]

//! End-to-end lifecycle tests: an in-memory document, a mutation observer
//! subscription, and a registry fed by `deliver()`.
//!
//! Every behavior appends to a shared log:
//!
//! | Event | Log entry |
//! |-------|-----------|
//! | connected | `+{tag}:{name}={value}` |
//! | changed | `~{tag}:{name} {old}->{new}` |
//! | disconnected | `-{tag}:{name}` |

use std::cell::RefCell;
use std::error::Error as _;
use std::rc::Rc;

use attrbind_runtime::{
    Attr, Behavior, CallbackResult, Lifecycle, Registry, RegistryConfig, RegistryError,
};
use attrbind_tree::{ChangeRecord, Document, Node};
use tracing_subscriber::EnvFilter;

type Log = Rc<RefCell<Vec<String>>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

struct Recorder {
    log: Log,
    fail_on: Option<&'static str>,
    fail_teardown: bool,
}

fn tag(node: &Node) -> String {
    node.tag_name().unwrap_or("?").to_owned()
}

impl Behavior<Node> for Recorder {
    fn connected(&mut self, attr: Attr<'_, Node>) -> CallbackResult {
        self.log.borrow_mut().push(format!(
            "+{}:{}={}",
            tag(attr.owner()),
            attr.name(),
            attr.value()
        ));
        if self.fail_on == Some(attr.value()) {
            return Err(format!("refusing value {:?}", attr.value()).into());
        }
        Ok(())
    }

    fn changed(&mut self, attr: Attr<'_, Node>, old: &str, new: &str) -> CallbackResult {
        self.log
            .borrow_mut()
            .push(format!("~{}:{} {old}->{new}", tag(attr.owner()), attr.name()));
        if self.fail_on == Some(new) {
            return Err("changed failed".into());
        }
        Ok(())
    }

    fn disconnected(&mut self, attr: Attr<'_, Node>) -> CallbackResult {
        self.log
            .borrow_mut()
            .push(format!("-{}:{}", tag(attr.owner()), attr.name()));
        if self.fail_teardown {
            return Err("teardown failed".into());
        }
        Ok(())
    }
}

struct Harness {
    doc: Document,
    registry: Registry<Node>,
    log: Log,
}

impl Harness {
    fn new() -> Self {
        init_tracing();
        let doc = Document::new();
        let registry = Registry::observe(doc.root().clone(), &doc);
        Self {
            doc,
            registry,
            log: Log::default(),
        }
    }

    fn define(&mut self, name: &str) {
        self.define_failing(name, None);
    }

    fn define_failing(&mut self, name: &str, fail_on: Option<&'static str>) {
        self.define_with(name, fail_on, false);
    }

    /// Define `name` with a `disconnected` callback that always fails.
    fn define_failing_teardown(&mut self, name: &str) {
        self.define_with(name, None, true);
    }

    fn define_with(&mut self, name: &str, fail_on: Option<&'static str>, fail_teardown: bool) {
        let log = Rc::clone(&self.log);
        self.registry
            .define(name, move || Recorder {
                log: Rc::clone(&log),
                fail_on,
                fail_teardown,
            })
            .unwrap();
    }

    fn element(&self, tag: &str) -> Node {
        self.doc.create_element(tag)
    }

    fn attached(&self, tag: &str) -> Node {
        let node = self.element(tag);
        self.doc.root().append_child(&node).unwrap();
        node
    }

    fn deliver(&mut self) -> usize {
        self.registry.deliver().unwrap()
    }

    fn take_log(&self) -> Vec<String> {
        std::mem::take(&mut *self.log.borrow_mut())
    }
}

// ── Scenarios A–D ─────────────────────────────────────────────────────────

#[test]
fn scenario_connect_change_remove_attribute_remove_node() {
    let mut h = Harness::new();
    h.define("data-foo");

    // A: node with the attribute is added.
    let div = h.element("div");
    div.set_attribute("data-foo", "1").unwrap();
    h.doc.root().append_child(&div).unwrap();
    h.deliver();
    assert_eq!(h.take_log(), vec!["+div:data-foo=1"]);
    let first = h.registry.get(&div, "data-foo").unwrap().id();

    // B: value changes.
    div.set_attribute("data-foo", "2").unwrap();
    h.deliver();
    assert_eq!(h.take_log(), vec!["~div:data-foo 1->2"]);
    assert_eq!(h.registry.get(&div, "data-foo").unwrap().value(), "2");
    assert_eq!(h.registry.get(&div, "data-foo").unwrap().id(), first);

    // C: attribute removed.
    div.remove_attribute("data-foo");
    h.deliver();
    assert_eq!(h.take_log(), vec!["-div:data-foo"]);
    assert!(h.registry.get(&div, "data-foo").is_none());

    // D: attribute back, then node removed.
    div.set_attribute("data-foo", "3").unwrap();
    h.deliver();
    div.remove();
    h.deliver();
    assert_eq!(h.take_log(), vec!["+div:data-foo=3", "-div:data-foo"]);
    assert!(h.registry.get(&div, "data-foo").is_none());
    assert_eq!(h.registry.live_instances(), 0);
}

// ── Presence invariant ────────────────────────────────────────────────────

#[test]
fn instance_exists_iff_connected_and_carrying() {
    let mut h = Harness::new();
    h.define("a");

    let connected_with = h.attached("p");
    connected_with.set_attribute("a", "x").unwrap();
    let connected_without = h.attached("p");
    let detached_with = h.element("p");
    detached_with.set_attribute("a", "x").unwrap();
    let detached_without = h.element("p");
    h.deliver();

    assert!(h.registry.get(&connected_with, "a").is_some());
    assert!(h.registry.get(&connected_without, "a").is_none());
    assert!(h.registry.get(&detached_with, "a").is_none());
    assert!(h.registry.get(&detached_without, "a").is_none());
}

#[test]
fn get_never_creates() {
    let mut h = Harness::new();
    let div = h.attached("div");
    div.set_attribute("a", "1").unwrap();
    h.deliver();
    // Not yet defined: nothing to find, nothing created.
    assert!(h.registry.get(&div, "a").is_none());
    assert_eq!(h.registry.live_instances(), 0);
}

// ── Idempotence and ordering ──────────────────────────────────────────────

#[test]
fn equal_value_change_is_ignored() {
    let mut h = Harness::new();
    h.define("a");
    let div = h.attached("div");
    div.set_attribute("a", "1").unwrap();
    h.deliver();
    h.take_log();

    div.set_attribute("a", "1").unwrap();
    assert_eq!(h.deliver(), 1);
    assert!(h.take_log().is_empty());
}

#[test]
fn add_then_set_in_one_batch_connects_once() {
    let mut h = Harness::new();
    h.define("a");
    let div = h.attached("div");
    div.set_attribute("a", "1").unwrap();
    assert_eq!(h.deliver(), 2);
    assert_eq!(h.take_log(), vec!["+div:a=1"]);
    assert_eq!(h.registry.live_instances(), 1);
}

#[test]
fn batch_reads_final_values() {
    let mut h = Harness::new();
    h.define("a");
    let div = h.attached("div");
    div.set_attribute("a", "1").unwrap();
    h.deliver();
    h.take_log();

    div.set_attribute("a", "2").unwrap();
    div.set_attribute("a", "3").unwrap();
    h.deliver();
    // The first record carries the final value; the second is then a no-op.
    assert_eq!(h.take_log(), vec!["~div:a 1->3"]);
}

// ── Unconditional removal ─────────────────────────────────────────────────

#[test]
fn empty_values_are_still_torn_down() {
    let mut h = Harness::new();
    h.define("flag");
    let a = h.attached("a");
    let b = h.attached("b");
    a.set_attribute("flag", "").unwrap();
    b.set_attribute("flag", "").unwrap();
    h.deliver();
    assert_eq!(h.take_log(), vec!["+a:flag=", "+b:flag="]);

    a.remove_attribute("flag");
    b.remove();
    h.deliver();
    assert_eq!(h.take_log(), vec!["-a:flag", "-b:flag"]);
}

#[test]
fn removed_subtree_is_fully_torn_down() {
    let mut h = Harness::new();
    h.define("a");
    h.define("b");
    let outer = h.attached("outer");
    let middle = h.element("middle");
    let inner = h.element("inner");
    outer.append_child(&middle).unwrap();
    middle.append_child(&inner).unwrap();
    outer.set_attribute("a", "1").unwrap();
    middle.set_attribute("b", "2").unwrap();
    inner.set_attribute("a", "3").unwrap();
    inner.set_attribute("b", "4").unwrap();
    h.deliver();
    assert_eq!(h.registry.live_instances(), 4);
    h.take_log();

    outer.remove();
    h.deliver();
    assert_eq!(
        h.take_log(),
        vec!["-outer:a", "-middle:b", "-inner:a", "-inner:b"]
    );
    assert_eq!(h.registry.live_instances(), 0);
    assert_eq!(h.registry.tracked_nodes(), 0);
}

#[test]
fn moving_a_node_rebinds_it() {
    let mut h = Harness::new();
    h.define("a");
    let left = h.attached("left");
    let right = h.attached("right");
    let item = h.element("item");
    item.set_attribute("a", "1").unwrap();
    left.append_child(&item).unwrap();
    h.deliver();
    let before = h.registry.get(&item, "a").unwrap().id();
    h.take_log();

    right.append_child(&item).unwrap();
    h.deliver();
    assert_eq!(h.take_log(), vec!["-item:a", "+item:a=1"]);
    assert_ne!(h.registry.get(&item, "a").unwrap().id(), before);
}

#[test]
fn leaving_an_element_root_disconnects() {
    init_tracing();
    let doc = Document::new();
    let host = doc.create_element("host");
    let outside = doc.create_element("outside");
    doc.root().append_child(&host).unwrap();
    doc.root().append_child(&outside).unwrap();
    let item = doc.create_element("item");
    item.set_attribute("a", "1").unwrap();
    host.append_child(&item).unwrap();

    let log = Log::default();
    let mut registry = Registry::observe(host.clone(), &doc);
    let recorder_log = Rc::clone(&log);
    registry
        .define("a", move || Recorder {
            log: Rc::clone(&recorder_log),
            fail_on: None,
            fail_teardown: false,
        })
        .unwrap();
    assert!(registry.get(&item, "a").is_some());

    outside.append_child(&item).unwrap();
    registry.deliver().unwrap();
    assert!(registry.get(&item, "a").is_none());

    // Changes outside the monitored root are never reported.
    item.set_attribute("a", "2").unwrap();
    assert_eq!(registry.deliver().unwrap(), 0);
    assert_eq!(*log.borrow(), vec!["+item:a=1", "-item:a"]);
}

#[test]
fn text_nodes_are_ignored() {
    let mut h = Harness::new();
    h.define("a");
    let text = h.doc.create_text("hello");
    h.doc.root().append_child(&text).unwrap();
    h.deliver();
    assert_eq!(h.registry.live_instances(), 0);
    assert!(h.take_log().is_empty());
}

// ── Definitions ───────────────────────────────────────────────────────────

#[test]
fn definition_after_use_upgrades_existing_nodes() {
    let mut h = Harness::new();
    let a = h.attached("a");
    let b = h.element("b");
    a.append_child(&b).unwrap();
    a.set_attribute("late", "1").unwrap();
    b.set_attribute("late", "2").unwrap();
    h.deliver();
    assert!(h.take_log().is_empty());

    h.define("late");
    assert_eq!(h.take_log(), vec!["+a:late=1", "+b:late=2"]);
    assert_eq!(h.registry.live_instances(), 2);
}

#[test]
fn redefinition_does_not_rebuild() {
    let mut h = Harness::new();
    h.define("a");
    let div = h.attached("div");
    div.set_attribute("a", "1").unwrap();
    h.deliver();
    let id = h.registry.get(&div, "a").unwrap().id();
    h.take_log();

    h.define("a");
    assert!(h.take_log().is_empty());
    assert_eq!(h.registry.get(&div, "a").unwrap().id(), id);
}

// ── Failures ──────────────────────────────────────────────────────────────

#[test]
fn failing_connected_aborts_the_batch() {
    let mut h = Harness::new();
    h.define_failing("a", Some("bad"));
    let bad = h.element("bad");
    let good = h.element("good");
    bad.set_attribute("a", "bad").unwrap();
    good.set_attribute("a", "ok").unwrap();
    h.doc.root().append_child(&bad).unwrap();
    h.doc.root().append_child(&good).unwrap();

    let err = h.registry.deliver().unwrap_err();
    let RegistryError::Callback(cb) = &err else {
        panic!("expected callback error, got {err:?}");
    };
    assert_eq!(cb.phase, Lifecycle::Connected);
    assert_eq!(cb.name, "a");
    assert_eq!(cb.node, bad.id());
    assert!(err.source().is_some());

    // The failing instance stays committed; the rest of the batch was dropped.
    assert!(h.registry.get(&bad, "a").is_some());
    assert!(h.registry.get(&good, "a").is_none());
    assert_eq!(h.take_log(), vec!["+bad:a=bad"]);
    assert_eq!(h.deliver(), 0);

    // Later records for the same nodes still reconcile normally.
    bad.set_attribute("a", "fine").unwrap();
    h.deliver();
    assert_eq!(h.take_log(), vec!["~bad:a bad->fine"]);
}

#[test]
fn failing_changed_keeps_new_value() {
    let mut h = Harness::new();
    h.define_failing("a", Some("boom"));
    let div = h.attached("div");
    div.set_attribute("a", "1").unwrap();
    h.deliver();

    div.set_attribute("a", "boom").unwrap();
    let err = h.registry.deliver().unwrap_err();
    assert!(matches!(
        err,
        RegistryError::Callback(ref cb) if cb.phase == Lifecycle::Changed
    ));
    assert_eq!(h.registry.get(&div, "a").unwrap().value(), "boom");
}

#[test]
fn failing_define_reports_the_node() {
    let mut h = Harness::new();
    let div = h.attached("div");
    div.set_attribute("a", "bad").unwrap();
    h.deliver();

    let log = Rc::clone(&h.log);
    let err = h
        .registry
        .define("a", move || Recorder {
            log: Rc::clone(&log),
            fail_on: Some("bad"),
            fail_teardown: false,
        })
        .unwrap_err();
    assert!(err.to_string().contains("connected callback for 'a'"));
    assert!(h.registry.is_defined("a"));
}

#[test]
fn failing_disconnected_keeps_remaining_instances() {
    let mut h = Harness::new();
    h.define_failing_teardown("a");
    h.define("b");
    let div = h.attached("div");
    div.set_attribute("a", "1").unwrap();
    div.set_attribute("b", "2").unwrap();
    h.deliver();

    div.remove();
    let err = h.registry.deliver().unwrap_err();
    assert!(matches!(
        err,
        RegistryError::Callback(ref cb) if cb.phase == Lifecycle::Disconnected && cb.name == "a"
    ));
    assert_eq!(h.take_log(), vec!["+div:a=1", "+div:b=2", "-div:a"]);
    assert!(h.registry.get(&div, "a").is_none());
    assert!(h.registry.get(&div, "b").is_some());

    // The next delivery finishes the teardown, even with nothing queued.
    assert_eq!(h.deliver(), 0);
    assert_eq!(h.take_log(), vec!["-div:b"]);
    assert!(h.registry.get(&div, "b").is_none());
    assert_eq!(h.registry.live_instances(), 0);
}

#[test]
fn aborted_subtree_teardown_is_swept_next_batch() {
    let mut h = Harness::new();
    h.define_failing_teardown("a");
    h.define("b");
    let outer = h.attached("div");
    let inner = h.element("span");
    outer.set_attribute("a", "1").unwrap();
    inner.set_attribute("b", "2").unwrap();
    outer.append_child(&inner).unwrap();
    h.deliver();
    h.take_log();

    outer.remove();
    assert!(h.registry.deliver().is_err());
    assert_eq!(h.take_log(), vec!["-div:a"]);
    assert!(h.registry.get(&inner, "b").is_some());

    // An unrelated batch sweeps the detached descendant first.
    let other = h.attached("p");
    other.set_attribute("b", "3").unwrap();
    h.deliver();
    assert_eq!(h.take_log(), vec!["-span:b", "+p:b=3"]);
    assert!(h.registry.get(&inner, "b").is_none());

    // Nothing is left pending afterwards.
    let batches = h.registry.stats().batches;
    assert_eq!(h.deliver(), 0);
    assert_eq!(h.registry.stats().batches, batches);
}

// ── Explicit batches ──────────────────────────────────────────────────────

#[test]
fn apply_accepts_hand_built_batches() {
    init_tracing();
    let doc = Document::new();
    let mut registry = Registry::builder()
        .root(doc.root().clone())
        .config(RegistryConfig::new().with_downgrade_descendants(false))
        .build()
        .unwrap();
    let log = Log::default();
    let recorder_log = Rc::clone(&log);
    registry
        .define("a", move || Recorder {
            log: Rc::clone(&recorder_log),
            fail_on: None,
            fail_teardown: false,
        })
        .unwrap();

    let outer = doc.create_element("outer");
    let inner = doc.create_element("inner");
    outer.append_child(&inner).unwrap();
    inner.set_attribute("a", "1").unwrap();
    doc.root().append_child(&outer).unwrap();

    registry
        .apply([ChangeRecord::added(doc.root().clone(), vec![outer.clone()])])
        .unwrap();
    assert!(registry.get(&inner, "a").is_some());

    // With descendant teardown disabled the service must report each node.
    outer.remove();
    registry
        .apply([ChangeRecord::removed(doc.root().clone(), vec![outer.clone()])])
        .unwrap();
    assert!(registry.get(&inner, "a").is_some());
    registry
        .apply([ChangeRecord::removed(outer.clone(), vec![inner.clone()])])
        .unwrap();
    assert!(registry.get(&inner, "a").is_none());
    assert_eq!(*log.borrow(), vec!["+inner:a=1", "-inner:a"]);
    assert_eq!(registry.stats().batches, 3);
}

#[test]
fn dropped_nodes_are_pruned() {
    let mut h = Harness::new();
    h.define("a");
    let div = h.attached("div");
    div.set_attribute("a", "1").unwrap();
    h.deliver();

    // Records for a node keep it alive until delivered; deliver the removal,
    // which also tears the instance down.
    div.remove();
    h.deliver();
    let weak = div.downgrade();
    drop(div);
    assert!(weak.upgrade().is_none());
    assert_eq!(h.registry.tracked_nodes(), 0);
    assert_eq!(h.registry.prune(), 0);
}
