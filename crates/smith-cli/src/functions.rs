use std::sync::{Arc, Mutex, MutexGuard};

use smith::functions::{LocalFunction, NoArgs};
use smith::schema::SchemaError;

/// Front-end state the model may change through local functions
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DisplayOptions {
    pub show_function_calls: bool,
    pub exit_requested: bool,
}

pub type SharedDisplay = Arc<Mutex<DisplayOptions>>;

pub fn lock(display: &SharedDisplay) -> MutexGuard<'_, DisplayOptions> {
    display.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// `show_function_calls`, `hide_function_calls` and `exit`
pub fn display_functions(display: &SharedDisplay) -> Result<Vec<LocalFunction>, SchemaError> {
    let show = display.clone();
    let hide = display.clone();
    let exit = display.clone();

    Ok(vec![
        LocalFunction::new(
            "show_function_calls",
            "Sets function calls and results to visible.",
            vec![],
            move |_: NoArgs| {
                let display = show.clone();
                async move {
                    lock(&display).show_function_calls = true;
                    Ok("Function calls are now visible.")
                }
            },
        )?,
        LocalFunction::new(
            "hide_function_calls",
            "Sets function calls and results to hidden.",
            vec![],
            move |_: NoArgs| {
                let display = hide.clone();
                async move {
                    lock(&display).show_function_calls = false;
                    Ok("Function calls are now hidden.")
                }
            },
        )?,
        LocalFunction::new(
            "exit",
            "Exits the chat.",
            vec![],
            move |_: NoArgs| {
                let display = exit.clone();
                async move {
                    lock(&display).exit_requested = true;
                    Ok("Goodbye!")
                }
            },
        )?,
    ])
}
