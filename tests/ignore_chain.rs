use dirdoc::ignore_chain::{IgnoreChain, IgnoreResolver};
use std::fs;
use tempfile::tempdir;

#[test]
fn directory_pattern_ignores_directory_but_not_prefixed_sibling() {
    let root = tempdir().unwrap();
    fs::write(root.path().join(".gitignore"), "build/\n").unwrap();
    fs::create_dir(root.path().join("build")).unwrap();
    fs::create_dir(root.path().join("buildsomething")).unwrap();

    let resolver = IgnoreResolver::default();
    let chain = IgnoreChain::new().extended(resolver.load_rule(root.path()));

    assert!(chain.is_ignored(&root.path().join("build"), true));
    assert!(!chain.is_ignored(&root.path().join("buildsomething"), true));
    // A file that happens to be called `build` is not matched by a directory pattern.
    assert!(!chain.is_ignored(&root.path().join("build"), false));
}

#[test]
fn rule_never_applies_outside_its_origin() {
    let root = tempdir().unwrap();
    let a = root.path().join("a");
    let b = root.path().join("b");
    fs::create_dir_all(&a).unwrap();
    fs::create_dir_all(&b).unwrap();
    fs::write(a.join(".gitignore"), "*.log\n").unwrap();

    let resolver = IgnoreResolver::default();
    let root_chain = IgnoreChain::new().extended(resolver.load_rule(root.path()));
    let a_chain = root_chain.extended(resolver.load_rule(&a));

    assert!(a_chain.is_ignored(&a.join("trace.log"), false));
    assert!(a_chain.is_ignored(&a.join("nested").join("trace.log"), false));
    assert!(!a_chain.is_ignored(&b.join("trace.log"), false));
    assert!(!a_chain.is_ignored(&root.path().join("trace.log"), false));
}

#[test]
fn sibling_chains_are_independent_copies() {
    let root = tempdir().unwrap();
    let a = root.path().join("a");
    let b = root.path().join("b");
    fs::create_dir_all(&a).unwrap();
    fs::create_dir_all(&b).unwrap();
    fs::write(a.join(".gitignore"), "secret.txt\n").unwrap();

    let resolver = IgnoreResolver::default();
    let base = IgnoreChain::new();
    let a_chain = base.extended(resolver.load_rule(&a));
    let b_chain = base.extended(resolver.load_rule(&b));

    assert_eq!(a_chain.len(), 1);
    assert!(b_chain.is_empty());
    assert!(base.is_empty());
}

#[test]
fn several_ignore_files_compile_into_one_rule() {
    let root = tempdir().unwrap();
    fs::write(root.path().join(".gitignore"), "*.tmp\n").unwrap();
    fs::write(root.path().join(".dirdocignore"), "fixtures/\n").unwrap();

    let rule = IgnoreResolver::default().load_rule(root.path()).expect("rule");
    assert_eq!(rule.pattern_count(), 2);

    let chain = IgnoreChain::new().extended(Some(rule));
    assert!(chain.is_ignored(&root.path().join("x.tmp"), false));
    assert!(chain.is_ignored(&root.path().join("fixtures"), true));
}

#[test]
fn builtin_names_are_ignored_without_any_rule() {
    let root = tempdir().unwrap();
    let chain = IgnoreChain::new();

    assert!(chain.is_ignored(&root.path().join("DIRDOC.md"), false));
    assert!(chain.is_ignored(&root.path().join("dirdoc_summary.md"), false));
    assert!(chain.is_ignored(&root.path().join(".git"), true));
    assert!(chain.is_ignored(&root.path().join("node_modules"), true));
    assert!(!chain.is_ignored(&root.path().join("node_modules"), false));
    assert!(!chain.is_ignored(&root.path().join("src"), true));
}

#[test]
fn custom_ignore_file_names_replace_defaults() {
    let root = tempdir().unwrap();
    fs::write(root.path().join(".gitignore"), "*.rs\n").unwrap();
    fs::write(root.path().join(".summaryignore"), "*.md\n").unwrap();

    let resolver = IgnoreResolver::new([".summaryignore"]);
    let chain = IgnoreChain::new().extended(resolver.load_rule(root.path()));

    assert!(chain.is_ignored(&root.path().join("notes.md"), false));
    assert!(!chain.is_ignored(&root.path().join("main.rs"), false));
}
