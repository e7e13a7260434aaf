//! Evaluation of candidate patches against real test commands.

use graft::fitness::{ResultLine, StdoutNumber};
use graft::{evaluate, Direction, Edit, EngineMap, Patch, Point, Program, ProgramConfig, Status};
use std::fs;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const TIMEOUT: Duration = Duration::from_secs(10);

fn project(files: &[(&str, &str)], config: ProgramConfig) -> (TempDir, Program) {
    let dir = TempDir::new().unwrap();
    for (name, source) in files {
        fs::write(dir.path().join(name), source).unwrap();
    }
    let program = Program::builder(dir.path())
        .config(config)
        .engines(EngineMap::trees())
        .build()
        .unwrap();
    (dir, program)
}

fn point_of(program: &Program, prefix: &str) -> Point {
    program
        .describe_points(0)
        .into_iter()
        .find(|row| row.text.starts_with(prefix))
        .map(|row| Point::new(0, row.index))
        .unwrap_or_else(|| panic!("no point starting with {prefix:?}"))
}

#[test]
fn number_on_stdout_is_success() {
    let config = ProgramConfig::new("echo 3", ["m.py"]);
    let (_dir, program) = project(&[("m.py", "x = 1\n")], config);
    let evaluation = evaluate(&program.patch(), TIMEOUT, &StdoutNumber).unwrap();
    assert_eq!(evaluation.status, Status::Success);
    assert_eq!(evaluation.fitness, Some(3.0));
}

#[test]
fn test_command_sees_the_patched_file() {
    let config = ProgramConfig::new("wc -l < m.py", ["m.py"]);
    let (_dir, program) = project(&[("m.py", "a = 1\nb = 2\n")], config);
    let patch = Patch::with_edits(
        &program,
        [Edit::Insertion {
            target: Point::new(0, 0),
            ingredient: Point::new(0, 1),
            direction: Direction::After,
        }],
    )
    .unwrap();

    let evaluation = evaluate(&patch, TIMEOUT, &StdoutNumber).unwrap();
    assert_eq!(evaluation.fitness, Some(3.0));
    assert_eq!(program.sandbox().read("m.py").unwrap(), "a = 1\nb = 2\nb = 2\n");

    // a later, smaller patch overwrites the earlier mutant
    let evaluation = evaluate(&program.patch(), TIMEOUT, &StdoutNumber).unwrap();
    assert_eq!(evaluation.fitness, Some(2.0));
    assert_eq!(program.sandbox().read("m.py").unwrap(), "a = 1\nb = 2\n");
}

#[test]
fn tagged_result_line() {
    let config = ProgramConfig::new(
        "echo 'running'; echo '[GRAFT_RESULT] {runtime: 1.5, failed: 0}'",
        ["m.py"],
    );
    let (_dir, program) = project(&[("m.py", "x = 1\n")], config);
    let evaluation = evaluate(&program.patch(), TIMEOUT, &ResultLine::new("runtime")).unwrap();
    assert_eq!(evaluation.status, Status::Success);
    assert_eq!(evaluation.fitness, Some(1.5));
}

#[test]
fn unreadable_output_is_a_parse_error() {
    let config = ProgramConfig::new("echo hello", ["m.py"]);
    let (_dir, program) = project(&[("m.py", "x = 1\n")], config);
    let evaluation = evaluate(&program.patch(), TIMEOUT, &StdoutNumber).unwrap();
    assert_eq!(evaluation.status, Status::ParseError);
    assert_eq!(evaluation.fitness, None);
}

#[test]
fn slow_command_times_out() {
    let config = ProgramConfig::new("sleep 30", ["m.py"]);
    let (_dir, program) = project(&[("m.py", "x = 1\n")], config);
    let start = Instant::now();
    let evaluation = evaluate(&program.patch(), Duration::from_millis(300), &StdoutNumber).unwrap();
    assert_eq!(evaluation.status, Status::Timeout);
    assert_eq!(evaluation.fitness, None);
    assert!(start.elapsed() < Duration::from_secs(10));
}

#[test]
fn background_children_do_not_hold_the_run() {
    let config = ProgramConfig::new("sleep 30 & echo 4", ["m.py"]);
    let (_dir, program) = project(&[("m.py", "x = 1\n")], config);
    let start = Instant::now();
    let evaluation = evaluate(&program.patch(), TIMEOUT, &StdoutNumber).unwrap();
    assert_eq!(evaluation.status, Status::Success);
    assert_eq!(evaluation.fitness, Some(4.0));
    assert!(start.elapsed() < Duration::from_secs(10));
}

#[cfg(target_os = "linux")]
#[test]
fn timeout_kills_the_whole_process_group() {
    let config = ProgramConfig::new("sleep 30 & echo $! > child.pid; wait", ["m.py"]);
    let (_dir, program) = project(&[("m.py", "x = 1\n")], config);
    let evaluation = evaluate(&program.patch(), Duration::from_millis(500), &StdoutNumber).unwrap();
    assert_eq!(evaluation.status, Status::Timeout);

    let pid = program.sandbox().read("child.pid").unwrap();
    let stat = format!("/proc/{}/stat", pid.trim());
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        // gone, or a zombie waiting for its reaper
        let alive = fs::read_to_string(&stat)
            .map(|line| !line.contains(") Z"))
            .unwrap_or(false);
        if !alive {
            break;
        }
        assert!(Instant::now() < deadline, "sleep survived the timeout");
        std::thread::sleep(Duration::from_millis(50));
    }
}

#[test]
fn unapplicable_patch_is_invalid_without_running() {
    let config = ProgramConfig::new("touch ran; echo 1", ["m.py"]);
    let source = "def f():\n    x = 1\ny = 2\n";
    let (_dir, program) = project(&[("m.py", source)], config);
    let patch = Patch::with_edits(
        &program,
        [
            Edit::Replacement {
                target: point_of(&program, "def f"),
                ingredient: Some(point_of(&program, "y = 2")),
            },
            Edit::Deletion {
                target: point_of(&program, "x = 1"),
            },
        ],
    )
    .unwrap();

    let evaluation = evaluate(&patch, TIMEOUT, &StdoutNumber).unwrap();
    assert_eq!(evaluation.status, Status::Invalid);
    assert_eq!(evaluation.fitness, None);
    assert!(!program.sandbox().path().join("ran").exists());
}

const JAVA: &str = "\
class A {
    int f() {
        return 1;
    }
}
";

fn java_patch(program: &Program) -> Patch<'_> {
    Patch::with_edits(
        program,
        [Edit::Insertion {
            target: point_of(program, "int f()"),
            ingredient: point_of(program, "return 1;"),
            direction: Direction::Before,
        }],
    )
    .unwrap()
}

#[test]
fn syntax_regressions_are_invalid_when_validating() {
    let mut config = ProgramConfig::new("echo 1", ["A.java"]);
    config.validate_syntax = true;
    let (_dir, program) = project(&[("A.java", JAVA)], config);

    let evaluation = evaluate(&java_patch(&program), TIMEOUT, &StdoutNumber).unwrap();
    assert_eq!(evaluation.status, Status::Invalid);

    let evaluation = evaluate(&program.patch(), TIMEOUT, &StdoutNumber).unwrap();
    assert_eq!(evaluation.status, Status::Success);
}

#[test]
fn syntax_is_not_checked_by_default() {
    let config = ProgramConfig::new("echo 1", ["A.java"]);
    let (_dir, program) = project(&[("A.java", JAVA)], config);
    let evaluation = evaluate(&java_patch(&program), TIMEOUT, &StdoutNumber).unwrap();
    assert_eq!(evaluation.status, Status::Success);
    assert!(program
        .sandbox()
        .read("A.java")
        .unwrap()
        .contains("return 1;\n    int f()"));
}
