use codecell::trace;

use super::run_fixture;

#[tokio::test]
#[ignore = "requires docker"]
async fn test_run_hello_world_python() {
    let result = run_fixture("python", "hello.py", None).await;

    assert!(result.is_success());
    assert_eq!(result.stdout, "Hello, World!\n");
    assert_eq!(result.stderr, "");
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_run_hello_world_javascript_alias() {
    let result = run_fixture("js", "hello.js", None).await;

    assert!(result.is_success());
    assert_eq!(result.stdout, "Hello, World!\n");
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_run_hello_world_c() {
    let result = run_fixture("c", "hello.c", None).await;

    assert!(result.is_success(), "stderr: {}", result.stderr);
    assert_eq!(result.stdout, "Hello, World!\n");
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_run_hello_world_cpp() {
    let result = run_fixture("cpp", "hello.cpp", None).await;

    assert!(result.is_success(), "stderr: {}", result.stderr);
    assert_eq!(result.stdout, "Hello, World!\n");
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_run_hello_world_java() {
    let result = run_fixture("java", "Main.java", None).await;

    assert!(result.is_success(), "stderr: {}", result.stderr);
    assert_eq!(result.stdout, "Hello, World!\n");
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_run_runtime_error() {
    let result = run_fixture("python", "runtime_error.py", None).await;

    assert!(!result.is_success());
    assert_eq!(result.exit_code, Some(1));
    assert_eq!(result.stdout, "before failure\n");
    assert!(result.stderr.contains("ValueError: boom"));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_compile_error_does_not_run() {
    let result = run_fixture("c", "compile_error.c", None).await;

    assert!(!result.is_success());
    assert_eq!(result.stdout, "");
    assert!(result.stderr.contains("undefined_symbol"));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_trace_lines_pass_through() {
    let result = run_fixture("python", "bubble_sort.py", None).await;

    assert!(result.is_success());
    assert!(result.stdout.contains("__VIS__:{\"arr\": [5, 3, 8, 4, 2]"));

    let steps = trace::parse_output(&result.stdout);
    assert_eq!(steps.len(), 10);
    assert_eq!(steps[0].kind.as_deref(), Some("sort"));
    assert_eq!(trace::strip_trace_lines(&result.stdout), "Sorted: [2, 3, 4, 5, 8]\n");
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_legacy_trace_lines_pass_through() {
    let result = run_fixture("cpp", "bubble_sort.cpp", None).await;

    assert!(result.is_success(), "stderr: {}", result.stderr);
    let steps = trace::parse_output(&result.stdout);
    assert_eq!(steps.len(), 10);
    assert_eq!(steps[0].arr, vec![5.0, 3.0, 8.0, 4.0, 2.0]);
    assert_eq!((steps[0].i, steps[0].j), (Some(0), Some(1)));
}
