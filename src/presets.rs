// Presets - ready-made prompt layouts
//
// Each preset returns a setup routine for `add_prompt`. Input handlers only
// submit while the prompt is enabled, so a disabled prompt ignores stray
// clicks and key presses between rounds.

use crate::error::{Error, Result};
use crate::prompt::{Prompt, PromptSetup, setup_fn};
use crate::ui::context::UiContext;
use crate::ui::toolkit::{PlacementId, UiEvent, WidgetId, WidgetSpec};
use indexmap::IndexMap;
use tracing::warn;

/// Add a static text widget.
pub fn label(ui: &UiContext, parent: PlacementId, text: impl Into<String>) -> Result<WidgetId> {
    ui.create_widget(parent, &WidgetSpec::Label { text: text.into() })
}

/// A labelled row of buttons, each yielding its mapped value.
///
/// # Arguments
/// * `prompt_text` - Text above the buttons; empty for none
/// * `buttons` - Button label to value, in display order
/// * `keybindings` - Root-window key to button label
///
/// # Returns
/// A setup routine. It fails with [`Error::InvalidLayout`] when `buttons` is
/// empty or a keybinding names an undefined button.
pub fn button_row<V>(
    prompt_text: impl Into<String>,
    buttons: IndexMap<String, V>,
    keybindings: IndexMap<char, String>,
) -> impl PromptSetup<V>
where
    V: Clone + Send + 'static,
{
    let prompt_text = prompt_text.into();
    setup_fn(move |prompt: &Prompt<V>, ui: &UiContext, placement| {
        if buttons.is_empty() {
            return Err(Error::InvalidLayout("button row needs at least one button".into()));
        }
        let missing: Vec<&str> = keybindings
            .values()
            .filter(|name| !buttons.contains_key(*name))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(Error::InvalidLayout(format!(
                "keybindings reference undefined buttons: {:?}",
                missing
            )));
        }

        prompt.declare_return_type()?;

        if !prompt_text.is_empty() {
            label(ui, placement, prompt_text)?;
        }

        let row = ui.create_placement(placement)?;
        for (name, value) in &buttons {
            let button = ui.create_widget(row, &WidgetSpec::Button { text: name.clone() })?;
            prompt.track_interactive_widget(button)?;

            let target = prompt.clone();
            let value = value.clone();
            ui.on_widget_event(button, move |_, _| {
                if target.is_enabled() {
                    submit_logged(&target, value.clone());
                }
            })?;
        }

        if !keybindings.is_empty() {
            let target = prompt.clone();
            let bound: IndexMap<char, V> = keybindings
                .into_iter()
                .filter_map(|(key, name)| buttons.get(&name).map(|v| (key, v.clone())))
                .collect();
            let binding = ui.bind_root_key(move |_, key| {
                if let Some(value) = bound.get(&key) {
                    if target.is_enabled() {
                        submit_logged(&target, value.clone());
                    }
                }
            })?;
            prompt.track_root_keybinding(binding)?;
        }

        Ok(())
    })
}

/// A labelled text entry; committing the text submits it.
pub fn text_entry(prompt_text: impl Into<String>) -> impl PromptSetup<String> {
    let prompt_text = prompt_text.into();
    setup_fn(move |prompt: &Prompt<String>, ui: &UiContext, placement| {
        prompt.declare_return_type()?;
        if !prompt_text.is_empty() {
            label(ui, placement, prompt_text)?;
        }

        let entry = ui.create_widget(placement, &WidgetSpec::TextEntry)?;
        prompt.track_interactive_widget(entry)?;

        let target = prompt.clone();
        ui.on_widget_event(entry, move |_, event| {
            if let UiEvent::TextCommitted(_, text) = event {
                if target.is_enabled() {
                    submit_logged(&target, text.clone());
                }
            }
        })
    })
}

/// A labelled dropdown; choosing an option submits its value.
///
/// Out-of-range selections are ignored. An empty option list is an
/// [`Error::InvalidLayout`].
pub fn dropdown<V>(prompt_text: impl Into<String>, options: Vec<(String, V)>) -> impl PromptSetup<V>
where
    V: Clone + Send + 'static,
{
    let prompt_text = prompt_text.into();
    setup_fn(move |prompt: &Prompt<V>, ui: &UiContext, placement| {
        if options.is_empty() {
            return Err(Error::InvalidLayout("dropdown needs at least one option".into()));
        }
        prompt.declare_return_type()?;
        if !prompt_text.is_empty() {
            label(ui, placement, prompt_text)?;
        }

        let (names, values): (Vec<String>, Vec<V>) = options.into_iter().unzip();
        let menu = ui.create_widget(placement, &WidgetSpec::Dropdown { options: names })?;
        prompt.track_interactive_widget(menu)?;

        let target = prompt.clone();
        ui.on_widget_event(menu, move |_, event| {
            let UiEvent::Selected(_, index) = event else {
                return;
            };
            match values.get(*index) {
                Some(value) if target.is_enabled() => submit_logged(&target, value.clone()),
                Some(_) => {}
                None => warn!("Ignoring out-of-range selection {} on {}", index, target.id()),
            }
        })
    })
}

fn submit_logged<V: Clone + Send + 'static>(prompt: &Prompt<V>, value: V) {
    if let Err(e) = prompt.submit(value) {
        warn!("Submit to {} failed: {}", prompt.id(), e);
    }
}
