use std::fs;

use pretty_assertions::assert_eq;

use super::*;

fn package(root: &Path, read_only: bool) -> ResolvedPackage {
    ResolvedPackage {
        name: "three".to_string(),
        root: root.to_path_buf(),
        read_only,
    }
}

fn three_root() -> (tempfile::TempDir, PathBuf) {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("node_modules").join("three");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("package.json"), r#"{"main": "build/three.cjs", "module": "build/three.module.js"}"#)
        .unwrap();
    (tmp, root)
}

#[test]
fn test_subpath_import_rewritten_to_resolved_path() {
    let (_tmp, root) = three_root();
    let rewriter = ImportRewriter::new("@lumen/effects");
    let source = "import x from 'three/examples/jsm/controls.js';\n";

    let out = rewriter.rewrite_package(source, "three", Some(&package(&root, false)));

    let expected = to_file_url(&root.join("examples/jsm/controls.js"));
    assert_eq!(out, format!("import x from '{expected}';\n"));
    assert!(!out.contains("'three/examples/jsm/controls.js'"));
}

#[test]
fn test_bare_import_points_at_entry() {
    let (_tmp, root) = three_root();
    let rewriter = ImportRewriter::new("@lumen/effects");
    let entry = to_file_url(&root.join("build/three.module.js"));
    let source = concat!(
        "import * as THREE from \"three\";\n",
        "import 'three';\n",
        "export { Vector3 } from 'three';\n",
        "const lazy = await import( 'three' );\n",
        "const cjs = require(\"three\");\n",
    );

    let out = rewriter.rewrite_package(source, "three", Some(&package(&root, false)));

    assert_eq!(
        out,
        format!(
            "import * as THREE from \"{entry}\";\nimport '{entry}';\nexport {{ Vector3 }} from '{entry}';\nconst lazy = await import( '{entry}' );\nconst cjs = require(\"{entry}\");\n"
        )
    );
}

#[test]
fn test_engine_package_is_byte_identical() {
    let (_tmp, root) = three_root();
    let rewriter = ImportRewriter::new("@lumen/effects");
    let source = "import { Effect } from '@lumen/effects';\nimport '@lumen/effects/shaders';\n";
    let resolved = ResolvedPackage {
        name: "@lumen/effects".to_string(),
        root,
        read_only: false,
    };

    let out = rewriter.rewrite_package(source, "@lumen/effects", Some(&resolved));
    assert_eq!(out.as_bytes(), source.as_bytes());
}

#[test]
fn test_read_only_and_unresolved_left_untouched() {
    let (_tmp, root) = three_root();
    let rewriter = ImportRewriter::new("@lumen/effects");
    let source = "import x from 'three/sub';\n";

    assert_eq!(rewriter.rewrite_package(source, "three", Some(&package(&root, true))), source);
    assert_eq!(rewriter.rewrite_package(source, "three", None), source);
}

#[test]
fn test_similar_package_names_not_matched() {
    let (_tmp, root) = three_root();
    let rewriter = ImportRewriter::new("@lumen/effects");
    let source = "import a from 'three-stdlib';\nimport b from 'threejs/x';\n";

    let out = rewriter.rewrite_package(source, "three", Some(&package(&root, false)));
    assert_eq!(out, source);
}

#[test]
fn test_regex_metacharacters_in_package_name() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("weird");
    fs::create_dir_all(&root).unwrap();
    let resolved = ResolvedPackage {
        name: "a.b+c".to_string(),
        root: root.clone(),
        read_only: false,
    };
    let rewriter = ImportRewriter::new("@lumen/effects");
    let source = "import a from 'a.b+c/x.js';\nimport b from 'aXb+c/x.js';\n";

    let out = rewriter.rewrite_package(source, "a.b+c", Some(&resolved));
    assert_eq!(
        out,
        format!(
            "import a from '{}';\nimport b from 'aXb+c/x.js';\n",
            to_file_url(&root.join("x.js"))
        )
    );
}

#[test]
fn test_relative_in_place_keeps_extension() {
    let rewriter = ImportRewriter::new("@lumen/effects");
    let dir = PathBuf::from("/plugins/glow");
    let source = "import { a } from './lib/a.js';\nconst b = require('../shared/b.cjs');\n";

    let out = rewriter.rewrite_relative(source, &RelativeAnchor::in_place(&dir));
    assert_eq!(
        out,
        "import { a } from 'file:///plugins/glow/lib/a.js';\nconst b = require('file:///plugins/shared/b.cjs');\n"
    );
}

#[test]
fn test_relative_materialized_normalizes_extensions() {
    let tmp = tempfile::tempdir().unwrap();
    let src = tmp.path().join("src");
    let dest = tmp.path().join("out");
    fs::create_dir_all(src.join("lib")).unwrap();
    fs::write(src.join("lib/util.js"), "").unwrap();
    fs::write(src.join("lib/index.js"), "").unwrap();
    fs::write(src.join("shader.glsl"), "").unwrap();
    let anchor = RelativeAnchor {
        target_dir: dest.clone(),
        source_dir: src,
        normalize_extensions: true,
    };
    let rewriter = ImportRewriter::new("@lumen/effects");
    let source = concat!(
        "import a from './lib/a.cjs';\n",
        "import u from './lib/util';\n",
        "import l from './lib';\n",
        "const s = import(\"./shader.glsl?raw\");\n",
    );

    let out = rewriter.rewrite_relative(source, &anchor);
    assert_eq!(
        out,
        format!(
            "import a from '{}';\nimport u from '{}';\nimport l from '{}';\nconst s = import(\"{}?raw\");\n",
            to_file_url(&dest.join("lib/a.mjs")),
            to_file_url(&dest.join("lib/util.mjs")),
            to_file_url(&dest.join("lib/index.mjs")),
            to_file_url(&dest.join("shader.glsl")),
        )
    );
}

#[test]
fn test_rewrite_is_stable_on_second_pass() {
    let (_tmp, root) = three_root();
    let rewriter = ImportRewriter::new("@lumen/effects");
    let packages = vec![("three".to_string(), Some(package(&root, false)))];
    let anchor = RelativeAnchor::in_place(Path::new("/plugins/glow"));
    let source = "import * as T from 'three';\nimport a from './a.js';\n";

    let once = rewriter.rewrite_module(source, &packages, &anchor);
    let twice = rewriter.rewrite_module(&once, &packages, &anchor);
    assert_eq!(once, twice);
}

#[test]
fn test_identifiers_ending_in_keywords_ignored() {
    let (_tmp, root) = three_root();
    let rewriter = ImportRewriter::new("@lumen/effects");
    let source = "const x = myrequire('three');\n";

    let out = rewriter.rewrite_package(source, "three", Some(&package(&root, false)));
    assert_eq!(out, source);
}

#[test]
fn test_file_url_encoding() {
    assert_eq!(to_file_url(Path::new("/a b/c#d.js")), "file:///a%20b/c%23d.js");
    assert_eq!(to_file_url(Path::new("/plain/x.mjs")), "file:///plain/x.mjs");
}

#[test]
fn test_file_url_escapes_string_delimiters() {
    let url = to_file_url(Path::new("/it's/\"quoted\"/x.js"));

    assert_eq!(url, "file:///it%27s/%22quoted%22/x.js");
    assert!(!url.contains(['\'', '"', '\\']));
}

#[test]
fn test_file_url_leaves_relative_paths() {
    assert_eq!(to_file_url(Path::new("lib/x.js")), "lib/x.js");
}

#[test]
fn test_normalize_lexically() {
    assert_eq!(
        normalize_lexically(Path::new("/a/b/./c/../d")),
        PathBuf::from("/a/b/d")
    );
}

#[test]
fn test_has_module_extension() {
    assert!(has_module_extension(Path::new("a.js")));
    assert!(has_module_extension(Path::new("a.cjs")));
    assert!(has_module_extension(Path::new("a.mjs")));
    assert!(!has_module_extension(Path::new("a.json")));
    assert!(!has_module_extension(Path::new("a")));
}
