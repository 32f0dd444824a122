use std::path::PathBuf;
use std::time::Duration;

use rasterpool_lib::RenderError;

#[test]
fn config_error_display_includes_message() {
    let err = RenderError::Config("missing viewport".to_string());

    assert_eq!(format!("{}", err), "Configuration error: missing viewport");
}

#[test]
fn io_error_display_wraps_source() {
    let io_err = std::io::Error::other("disk full");
    let err: RenderError = io_err.into();
    let rendered = format!("{}", err);

    assert!(rendered.starts_with("IO error: "));
    assert!(rendered.contains("disk full"));
}

#[test]
fn navigation_helper_includes_url_and_message() {
    let err = RenderError::navigation("https://example.com", "net::ERR_CONNECTION_REFUSED");

    assert_eq!(
        format!("{}", err),
        "Navigation failed for https://example.com: net::ERR_CONNECTION_REFUSED"
    );
}

#[test]
fn timeout_helper_names_the_stage() {
    let err = RenderError::timeout("image wait", Duration::from_secs(15));
    let rendered = format!("{}", err);

    assert!(rendered.contains("image wait"));
    assert!(rendered.contains("15s"));
}

#[test]
fn missing_artifact_display_includes_path() {
    let err = RenderError::MissingArtifact(PathBuf::from("/tmp/card.html"));

    assert_eq!(
        format!("{}", err),
        "Render artifact not found: /tmp/card.html"
    );
}

#[test]
fn busy_display_names_the_job() {
    let err = RenderError::Busy("weekly-report".to_string());
    let rendered = format!("{}", err);

    assert!(rendered.contains("weekly-report"));
    assert!(rendered.contains("admission deadline"));
}
