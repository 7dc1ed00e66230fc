mod common;

use common::{items, list_template, Fixture, Template};
use kyute_bind::{Binding, ChangeFlags, EngineConfig, PathError, UpdateError, Visibility, NULL_SENTINEL};
use serde_json::json;

#[test]
fn set_redispatches_only_the_affected_binding() {
    let mut fx = Fixture::new(&list_template(), items(&["a", "b"]));
    let rows = fx.children(fx.root);

    fx.clear_log();
    let flags = fx.tree.set(fx.root, "items.0.name", "z").unwrap();

    assert!(flags.contains(ChangeFlags::BINDINGS));
    assert!(!flags.contains(ChangeFlags::STRUCTURE));
    assert_eq!(fx.host().applied, vec![(fx.visual(rows[0]), "text".to_owned(), json!("z"))]);
    assert_eq!(fx.tree.get(fx.root, "items.0.name").unwrap(), json!("z"));
    assert_eq!(fx.tree.get(rows[0], "name").unwrap(), json!("z"));
}

#[test]
fn set_from_a_repeated_child() {
    let mut fx = Fixture::new(&list_template(), items(&["a", "b"]));
    let rows = fx.children(fx.root);

    fx.clear_log();
    fx.tree.set(rows[1], "name", "y").unwrap();

    assert_eq!(fx.tree.get(fx.root, "items.1.name").unwrap(), json!("y"));
    assert_eq!(fx.host().applied, vec![(fx.visual(rows[1]), "text".to_owned(), json!("y"))]);
}

#[test]
fn missing_values_dispatch_the_sentinel() {
    let template = Template::new("label")
        .attr("text", "~user.name")
        .attr("visibility", "~flags.visible");
    let mut fx = Fixture::new(&template, json!({ "user": {} }));
    let visual = fx.visual(fx.root);

    assert_eq!(fx.last(fx.root, "text"), Some(NULL_SENTINEL));
    assert_eq!(fx.last(fx.root, "visibility"), Some(NULL_SENTINEL));
    assert_eq!(fx.host().visibility.get(&visual), Some(&Visibility::Gone));

    fx.tree.update(fx.root, Some(json!({ "user": { "name": "ann" } }))).unwrap();
    assert_eq!(fx.last(fx.root, "text"), Some(json!("ann")));
    assert_eq!(fx.host().visibility.get(&visual), Some(&Visibility::Visible));
}

#[test]
fn visibility_attributes_do_not_drive_visibility() {
    let template = Template::new("label").attr("visibility", "~shown");
    let fx = Fixture::new(&template, json!({}));
    assert_eq!(fx.last(fx.root, "visibility"), Some(NULL_SENTINEL));
    assert!(fx.host().visibility.is_empty());

    let config = EngineConfig {
        visibility_attributes: vec!["title".to_owned()],
        ..EngineConfig::default()
    };
    let template = Template::new("label").attr("title", "~missing");
    let fx = Fixture::with_config(&template, json!({}), config, Default::default());
    assert!(fx.host().visibility.is_empty());
}

#[test]
fn templates_render_text() {
    let template = Template::new("label")
        .attr("title", "Hello @{user.name}, @{user.age} @{user.missing}!")
        .attr("text", "static text");
    let fx = Fixture::new(&template, json!({ "user": { "name": "ann", "age": 31 } }));

    assert_eq!(fx.last(fx.root, "title"), Some(json!("Hello ann, 31 !")));
    assert_eq!(fx.count(fx.root, "text"), 0);
    assert!(fx.host().visibility.is_empty());
}

#[test]
fn failing_applier_does_not_stop_siblings() {
    let template = Template::new("label").attr("broken", "~a").attr("text", "~a");
    let fx = Fixture::new(&template, json!({ "a": 1 }));
    assert_eq!(fx.last(fx.root, "text"), Some(json!(1)));
}

#[test]
fn unknown_attributes() {
    let template = Template::new("label").attr("nonexistent", "~a").attr("text", "~a");
    let mut fx = Fixture::new(&template, json!({ "a": 1 }));
    assert_eq!(fx.tree.node(fx.root).unwrap().bindings().count(), 1);

    let err = fx.tree.add_binding(fx.root, Binding::direct("nonexistent", "a")).unwrap_err();
    assert!(matches!(err, UpdateError::UnknownAttribute(key) if key == "nonexistent"));

    fx.tree.add_binding(fx.root, Binding::direct("title", "a")).unwrap();
    assert_eq!(fx.count(fx.root, "title"), 0);
    fx.tree.update(fx.root, None).unwrap();
    assert_eq!(fx.last(fx.root, "title"), Some(json!(1)));
}

#[test]
fn point_updates_match_exact_paths() {
    let template = Template::new("label")
        .attr("text", "~user.name")
        .attr("title", "Age: @{user.age}");
    let mut fx = Fixture::new(&template, json!({ "user": { "name": "ann", "age": 31 } }));

    fx.clear_log();
    fx.tree.update_at_path(fx.root, "user").unwrap();
    assert!(fx.host().applied.is_empty());

    fx.tree.set(fx.root, "user.age", 32).unwrap();
    assert_eq!(fx.count(fx.root, "text"), 0);
    assert_eq!(fx.last(fx.root, "title"), Some(json!("Age: 32")));

    fx.tree.set(fx.root, "user.name", "bob").unwrap();
    assert_eq!(fx.last(fx.root, "text"), Some(json!("bob")));
}

#[test]
fn get_and_set_errors() {
    let mut fx = Fixture::new(&Template::new("label"), json!({ "user": { "name": "ann" }, "tags": ["x"] }));

    assert!(matches!(
        fx.tree.get(fx.root, "user.email"),
        Err(UpdateError::Path(PathError::NotFound { .. }))
    ));
    assert!(matches!(
        fx.tree.get(fx.root, "user.name.first"),
        Err(UpdateError::Path(PathError::TypeMismatch { .. }))
    ));
    assert!(matches!(
        fx.tree.set(fx.root, "nobody.name", "x"),
        Err(UpdateError::Path(PathError::NotFound { .. }))
    ));
    assert!(fx.tree.set(fx.root, "tags.3", "y").is_err());

    fx.tree.set(fx.root, "user.active", true).unwrap();
    fx.tree.set(fx.root, "tags.0", 2.5).unwrap();
    assert_eq!(
        fx.tree.get(fx.root, "").unwrap(),
        json!({ "user": { "name": "ann", "active": true }, "tags": [2.5] })
    );
}
