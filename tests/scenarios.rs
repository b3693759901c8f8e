use assert_fs::prelude::*;
use bulkedit::api::{edit_files, Batch};
use bulkedit::registry::Transform;
use bulkedit::{Config, Error, Pipeline, Registry};

fn run_quiet(config: Config) -> bulkedit::Result<(bulkedit::RunSummary, String)> {
    let (summary, out) = Pipeline::new(config)?.run_with_writer(Vec::new())?;
    Ok((summary, String::from_utf8(out).expect("utf-8 output")))
}

fn substitution(temp: &assert_fs::TempDir, write: bool) -> Config {
    Config::builder()
        .pattern("*.txt")
        .start_dir(temp.path())
        .expression("re.sub('foo', 'baz', line)")
        .write(write)
        .build()
        .unwrap()
}

#[test]
fn preview_shows_diff_and_leaves_file() {
    let temp = assert_fs::TempDir::new().unwrap();
    let file = temp.child("input.txt");
    file.write_str("foo\nbar\n").unwrap();

    let (summary, out) = run_quiet(substitution(&temp, false)).unwrap();

    assert_eq!(summary.changed, 1);
    assert!(out.contains("@@ -1,2 +1,2 @@"), "{out}");
    assert!(out.contains("-foo\n+baz\n bar\n"), "{out}");
    file.assert("foo\nbar\n");
}

#[test]
fn write_mode_rewrites_file() {
    let temp = assert_fs::TempDir::new().unwrap();
    let file = temp.child("input.txt");
    file.write_str("foo\nbar\n").unwrap();

    let (summary, out) = run_quiet(substitution(&temp, true)).unwrap();

    assert_eq!(summary.written, 1);
    assert!(out.contains("rewrote"));
    file.assert("baz\nbar\n");
}

#[test]
fn no_match_is_an_error_and_writes_nothing() {
    let temp = assert_fs::TempDir::new().unwrap();
    let file = temp.child("keep.md");
    file.write_str("foo\n").unwrap();

    let err = run_quiet(substitution(&temp, true)).unwrap_err();

    assert!(matches!(err, Error::NoMatch { .. }));
    file.assert("foo\n");
}

#[test]
fn function_rule_deletes_debug_lines() {
    let temp = assert_fs::TempDir::new().unwrap();
    let file = temp.child("app.log");
    file.write_str("start\nDEBUG a\nwork\nDEBUG b\nstop\n").unwrap();

    let registry = Registry::new().with(
        "logfilter",
        "strip_debug",
        Transform::lines_with_name(|lines, _file| {
            Ok(lines
                .iter()
                .filter(|line| !line.contains("DEBUG"))
                .cloned()
                .collect())
        }),
    );

    let config = Config::builder()
        .pattern("*.log")
        .start_dir(temp.path())
        .registry(registry)
        .function("logfilter:strip_debug")
        .write(true)
        .build()
        .unwrap();
    let (summary, _) = run_quiet(config).unwrap();

    assert_eq!(summary.changed, 1);
    file.assert("start\nwork\nstop\n");
}

#[cfg(unix)]
#[test]
fn failing_executable_only_fails_its_file() {
    let temp = assert_fs::TempDir::new().unwrap();
    let script = temp.child("fail_on_b.sh");
    script
        .write_str(
            "#!/bin/sh\n\
             case \"$BULKEDIT_FILE\" in\n  \
               *b.txt) echo 'refusing' >&2; exit 1 ;;\n\
             esac\n\
             tr a-z A-Z\n",
        )
        .unwrap();
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(script.path(), std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    let data = temp.child("data");
    data.child("a.txt").write_str("one\n").unwrap();
    data.child("b.txt").write_str("two\n").unwrap();
    data.child("c.txt").write_str("three\n").unwrap();

    let config = Config::builder()
        .pattern("*.txt")
        .start_dir(data.path())
        .executable(script.path().to_string_lossy())
        .write(true)
        .build()
        .unwrap();
    let (summary, _) = run_quiet(config).unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.failed, 1);
    assert!(matches!(summary.errors()[0], Error::RuleExecution { .. }));
    data.child("a.txt").assert("ONE\n");
    data.child("b.txt").assert("two\n");
    data.child("c.txt").assert("THREE\n");
}

#[test]
fn second_run_changes_nothing() {
    let temp = assert_fs::TempDir::new().unwrap();
    let file = temp.child("input.txt");
    file.write_str("foo\nfoo bar\n").unwrap();

    let (first, _) = run_quiet(substitution(&temp, true)).unwrap();
    let (second, out) = run_quiet(substitution(&temp, true)).unwrap();

    assert_eq!(first.changed, 1);
    assert_eq!(second.changed, 0);
    assert_eq!(second.unchanged, 1);
    assert!(out.is_empty());
    file.assert("baz\nbaz bar\n");
}

#[test]
fn identity_rule_never_changes() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("lf.txt").write_str("a\nb\n").unwrap();
    temp.child("crlf.txt").write_str("a\r\nb\r\n").unwrap();
    temp.child("bare.txt").write_str("no newline").unwrap();
    temp.child("empty.txt").touch().unwrap();

    let config = Config::builder()
        .pattern("*.txt")
        .start_dir(temp.path())
        .expression("line")
        .write(true)
        .build()
        .unwrap();
    let (summary, _) = run_quiet(config).unwrap();

    assert_eq!(summary.processed, 4);
    assert_eq!(summary.changed, 0);
    assert_eq!(summary.written, 0);
}

#[test]
fn crlf_is_kept_without_override() {
    let temp = assert_fs::TempDir::new().unwrap();
    let file = temp.child("dos.txt");
    file.write_str("foo\r\nbar\r\n").unwrap();

    run_quiet(substitution(&temp, true)).unwrap();

    file.assert("baz\r\nbar\r\n");
}

#[test]
fn depth_zero_stays_in_start_dir() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("top.txt").write_str("foo\n").unwrap();
    temp.child("sub/nested.txt").write_str("foo\n").unwrap();

    let config = Config::builder()
        .pattern("*.txt")
        .start_dir(temp.path())
        .max_depth(0)
        .expression("re.sub('foo', 'baz', line)")
        .write(true)
        .build()
        .unwrap();
    let (summary, _) = run_quiet(config).unwrap();

    assert_eq!(summary.processed, 1);
    temp.child("top.txt").assert("baz\n");
    temp.child("sub/nested.txt").assert("foo\n");
}

#[test]
fn overlapping_patterns_edit_once() {
    let temp = assert_fs::TempDir::new().unwrap();
    let file = temp.child("notes.txt");
    file.write_str("x\n").unwrap();

    let config = Config::builder()
        .patterns(["*.txt", "notes.*", "n*"])
        .start_dir(temp.path())
        .expression("line + 'x'")
        .write(true)
        .build()
        .unwrap();
    let (summary, _) = run_quiet(config).unwrap();

    assert_eq!(summary.processed, 1);
    file.assert("xx\n");
}

#[test]
fn expression_chain_and_deletion() {
    let temp = assert_fs::TempDir::new().unwrap();
    let file = temp.child("list.txt");
    file.write_str("keep 1\n# drop\nkeep 2\n").unwrap();

    let (summary, _) = Batch::files([file.path().to_string_lossy()])
        .expression("None if line.startswith('#') else line")
        .expression("line.upper()")
        .write()
        .run_with_writer(Vec::new())
        .unwrap();

    assert_eq!(summary.modified, vec![file.path().to_path_buf()]);
    file.assert("KEEP 1\nKEEP 2\n");
}

#[test]
fn edit_files_returns_modified_paths() {
    let temp = assert_fs::TempDir::new().unwrap();
    let changed = temp.child("changed.txt");
    let same = temp.child("same.txt");
    changed.write_str("foo\n").unwrap();
    same.write_str("bar\n").unwrap();

    let modified = edit_files(
        [
            changed.path().to_string_lossy().into_owned(),
            same.path().to_string_lossy().into_owned(),
        ],
        ["line.replace('foo', 'qux')"],
        true,
    )
    .unwrap();

    assert_eq!(modified, vec![changed.path().to_path_buf()]);
    changed.assert("qux\n");
    same.assert("bar\n");
}

#[test]
fn bad_expression_fails_before_any_file_is_read() {
    let temp = assert_fs::TempDir::new().unwrap();
    let file = temp.child("input.txt");
    file.write_str("foo\n").unwrap();

    let err = Batch::patterns(["*.txt"])
        .start_dir(temp.path())
        .expression("undefined_name + line")
        .write()
        .run()
        .unwrap_err();

    assert!(err.is_config());
    file.assert("foo\n");
}
