use indicatif::{ProgressBar, ProgressStyle};

use crate::ui::{OutputFormat, get_output_format, is_debug_enabled};

pub fn create_spinner(message: String) -> ProgressBar {
    // Spinners interleave badly with JSON events and debug command echoes
    if matches!(get_output_format(), OutputFormat::Json) || is_debug_enabled() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .template("{spinner} {msg} [{elapsed}]")
        .map(|s| s.tick_chars("⠁⠉⠙⠚⠒⠂⠒⠲⠴⠤⠄⠤⠠⠤⠦⠖⠒⠐⠒⠓⠋ "))
    {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Finish a spinner and print a success message with a checkmark
pub fn finish_spinner_with_success(pb: ProgressBar, message: impl Into<String>) {
    pb.finish_and_clear();
    crate::ui::emit(
        crate::ui::Level::Success,
        "progress.done",
        &format!("✓ {}", message.into()),
        None,
    );
}

pub fn finish_spinner_with_failure(pb: ProgressBar) {
    pb.finish_and_clear();
}
