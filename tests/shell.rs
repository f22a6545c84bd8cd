use std::fs;
use std::io;
use std::os::fd::AsFd;
use std::os::unix::fs::{MetadataExt, PermissionsExt};

use serial_test::serial;
use tempfile::TempDir;
use tiny_posix_shell::environment::Environment;
use tiny_posix_shell::executor::ExecOutcome;
use tiny_posix_shell::run_from_string;

/// A fresh shell whose `$dir` points at a scratch directory.
fn shell() -> (Environment, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut env = Environment::new();
    env.set("dir", dir.path().to_str().unwrap());
    (env, dir)
}

fn read(dir: &TempDir, name: &str) -> String {
    fs::read_to_string(dir.path().join(name)).unwrap()
}

fn stdout_inode() -> u64 {
    let fd = io::stdout().as_fd().try_clone_to_owned().unwrap();
    fs::File::from(fd).metadata().unwrap().ino()
}

#[test]
#[serial]
fn echo_into_files() {
    let (mut env, dir) = shell();
    let outcome = run_from_string("echo hello world > $dir/out; echo -n again >> \"$dir/out\"", &mut env);
    assert_eq!(outcome, ExecOutcome::Code(0));
    assert_eq!(read(&dir, "out"), "hello world\nagain");
}

#[test]
#[serial]
fn pipeline_of_programs() {
    let (mut env, dir) = shell();
    run_from_string("printf 'b\\na\\nc\\n' | sort | cat > $dir/sorted", &mut env);
    assert_eq!(read(&dir, "sorted"), "a\nb\nc\n");
    assert_eq!(env.last_status(), 0);
}

#[test]
#[serial]
fn pipeline_status_is_the_last_stage() {
    let (mut env, _dir) = shell();
    assert_eq!(run_from_string("true | false", &mut env), ExecOutcome::Code(1));
    assert_eq!(run_from_string("false | true", &mut env), ExecOutcome::Code(0));
    assert_eq!(run_from_string("! true | false", &mut env), ExecOutcome::Code(0));
}

#[test]
#[serial]
fn builtins_and_functions_in_pipelines() {
    let (mut env, dir) = shell();
    run_from_string("shout() { echo \"$1!\"; }; shout hey | cat > $dir/out", &mut env);
    assert_eq!(read(&dir, "out"), "hey!\n");
    // a stage runs in its own process
    run_from_string("echo inside | read piped", &mut env);
    assert_eq!(env.get("piped"), None);
}

#[test]
#[serial]
fn brace_group_redirection_does_not_leak() {
    let (mut env, dir) = shell();
    let before = stdout_inode();
    run_from_string("{ echo one; echo two; } > $dir/group; x=after", &mut env);
    assert_eq!(read(&dir, "group"), "one\ntwo\n");
    assert_eq!(stdout_inode(), before);
    assert!(env.saved_fds.is_empty());
    assert_eq!(env.get("x"), Some("after"));
}

#[test]
#[serial]
fn stderr_rewiring_follows_order() {
    let (mut env, dir) = shell();
    run_from_string("sh -c 'echo out; echo err >&2' > $dir/both 2>&1", &mut env);
    assert_eq!(read(&dir, "both"), "out\nerr\n");
    run_from_string("sh -c 'echo err >&2' 2> $dir/err", &mut env);
    assert_eq!(read(&dir, "err"), "err\n");
}

#[test]
#[serial]
fn group_output_and_stderr_share_a_file() {
    let (mut env, dir) = shell();
    let before = stdout_inode();
    run_from_string("{ echo out; sh -c 'echo err >&2'; } > $dir/both 2>&1", &mut env);
    assert_eq!(read(&dir, "both"), "out\nerr\n");
    // the rewiring saves fd 1 before the file replaces it
    run_from_string("{ echo kept; } >&1 > $dir/last", &mut env);
    assert_eq!(read(&dir, "last"), "kept\n");
    assert!(env.saved_fds.is_empty());
    assert_eq!(stdout_inode(), before);
}

#[test]
#[serial]
fn missing_command_reports_through_its_redirections() {
    let (mut env, dir) = shell();
    let outcome = run_from_string("no-such-command-anywhere 2> $dir/err > $dir/out", &mut env);
    assert_eq!(outcome, ExecOutcome::Code(127));
    assert!(read(&dir, "err").contains("no-such-command-anywhere: command not found"));
    assert_eq!(read(&dir, "out"), "");

    run_from_string("no-such-command-anywhere 2> $dir/stage | cat", &mut env);
    assert!(read(&dir, "stage").contains("no-such-command-anywhere: command not found"));
    assert_eq!(env.last_status(), 0);
}

#[test]
#[serial]
fn ambiguous_redirect_creates_nothing() {
    let (mut env, dir) = shell();
    let outcome = run_from_string("target=\"a b\"; echo hi > $dir/$target", &mut env);
    assert_eq!(outcome, ExecOutcome::Code(1));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
#[serial]
fn quoted_parameter_lists() {
    let (mut env, dir) = shell();
    env.set_positional(vec!["a b".into(), "c".into()]);
    run_from_string("printf '[%s]' \"$@\" > $dir/at", &mut env);
    assert_eq!(read(&dir, "at"), "[a b][c]");
    run_from_string("printf '[%s]' \"$*\" > $dir/star", &mut env);
    assert_eq!(read(&dir, "star"), "[a b c]");
    run_from_string("printf '[%s]' \"x$@y\" > $dir/joined", &mut env);
    assert_eq!(read(&dir, "joined"), "[xa b][cy]");

    env.set_positional(Vec::new());
    run_from_string("printf '[%s]' x \"$@\" > $dir/empty", &mut env);
    assert_eq!(read(&dir, "empty"), "[x]");
}

#[test]
#[serial]
fn field_splitting_and_globbing() {
    let (mut env, dir) = shell();
    for name in ["b.txt", "a.txt", "c.log"] {
        fs::write(dir.path().join(name), "").unwrap();
    }
    run_from_string("v='1   2'; printf '<%s>' $v \"$v\" > $dir/fields", &mut env);
    assert_eq!(read(&dir, "fields"), "<1><2><1   2>");

    run_from_string("for f in $dir/*.txt; do echo $f; done > $dir/globbed", &mut env);
    let base = dir.path().display();
    assert_eq!(read(&dir, "globbed"), format!("{base}/a.txt\n{base}/b.txt\n"));
    run_from_string("echo $dir/*.none > $dir/literal", &mut env);
    assert_eq!(read(&dir, "literal"), format!("{}/*.none\n", dir.path().display()));
}

#[test]
#[serial]
fn command_substitution_of_a_pipeline() {
    let (mut env, _dir) = shell();
    run_from_string("x=$(printf 'a\\nb\\n\\n' | cat)", &mut env);
    assert_eq!(env.get("x"), Some("a\nb"));
    run_from_string("words=$(echo one two)x", &mut env);
    assert_eq!(env.get("words"), Some("one twox"));
}

#[test]
#[serial]
fn exported_and_prefix_variables_reach_programs() {
    let (mut env, dir) = shell();
    run_from_string("export SHELL_TEST_FOO=bar; sh -c 'echo $SHELL_TEST_FOO' > $dir/exported", &mut env);
    assert_eq!(read(&dir, "exported"), "bar\n");
    run_from_string("SHELL_TEST_BAR=baz sh -c 'echo $SHELL_TEST_BAR' > $dir/prefixed", &mut env);
    assert_eq!(read(&dir, "prefixed"), "baz\n");
    assert_eq!(env.get("SHELL_TEST_BAR"), None);
    run_from_string("unexported=1; sh -c 'echo \"[$unexported]\"' > $dir/hidden", &mut env);
    assert_eq!(read(&dir, "hidden"), "[]\n");
}

#[test]
#[serial]
fn failing_commands() {
    let (mut env, dir) = shell();
    assert_eq!(run_from_string("no-such-command-anywhere", &mut env), ExecOutcome::Code(127));
    assert_eq!(run_from_string("$dir", &mut env), ExecOutcome::Code(127));

    let script = dir.path().join("not-executable");
    fs::write(&script, "echo hi\n").unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o644)).unwrap();
    assert_eq!(run_from_string("$dir/not-executable", &mut env), ExecOutcome::Code(126));

    assert_eq!(run_from_string("sh -c 'kill -TERM $$'", &mut env), ExecOutcome::Code(143));
    assert_eq!(run_from_string("cat < $dir/missing", &mut env), ExecOutcome::Code(1));
}

#[test]
#[serial]
fn status_variable() {
    let (mut env, dir) = shell();
    run_from_string("sh -c 'exit 7'; echo $? > $dir/status", &mut env);
    assert_eq!(read(&dir, "status"), "7\n");
    run_from_string("if sh -c 'exit 3'; then :; fi; echo $? >> $dir/status", &mut env);
    assert_eq!(read(&dir, "status"), "7\n0\n");
}

#[test]
#[serial]
fn syntax_errors_set_status() {
    let (mut env, _dir) = shell();
    assert_eq!(run_from_string("echo ok && && echo no", &mut env), ExecOutcome::Code(1));
    assert_eq!(env.last_status(), 1);
    assert_eq!(run_from_string("cat << EOF", &mut env), ExecOutcome::Code(1));
}

#[test]
#[serial]
fn exit_from_anywhere() {
    let (mut env, dir) = shell();
    assert_eq!(run_from_string("exit", &mut env), ExecOutcome::Exit(0));
    assert_eq!(run_from_string("false; exit", &mut env), ExecOutcome::Exit(1));
    let outcome = run_from_string("while true; do exit 4; done; echo no > $dir/after", &mut env);
    assert_eq!(outcome, ExecOutcome::Exit(4));
    assert!(!dir.path().join("after").exists());
    // only the pipeline stage exits
    assert_eq!(run_from_string("exit 5 | true", &mut env), ExecOutcome::Code(0));
}

#[test]
#[serial]
fn sourcing_a_script() {
    let (mut env, dir) = shell();
    let script = dir.path().join("lib.sh");
    fs::write(&script, "greet() {\n  echo \"hello $1\"\n}\nloaded=yes\n").unwrap();
    run_from_string(". $dir/lib.sh; greet you > $dir/greeting", &mut env);
    assert_eq!(env.get("loaded"), Some("yes"));
    assert_eq!(read(&dir, "greeting"), "hello you\n");
}

#[test]
#[serial]
fn multi_line_script() {
    let (mut env, dir) = shell();
    let script = "\
count=
for word in one two three
do
    if [ \"$word\" = two ]
    then
        continue_marker=$word
    else
        count=\"$count.\"
    fi
done
echo \"$count $continue_marker\" > \"$dir/summary\"
";
    assert_eq!(run_from_string(script, &mut env), ExecOutcome::Code(0));
    assert_eq!(read(&dir, "summary"), ".. two\n");
}
