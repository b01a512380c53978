mod keyboard;
mod pointer;

use crate::constants::{
    BUTTON_CONFIRM, BUTTON_FIT_HEIGHT, BUTTON_FIT_WALL, BUTTON_FIT_WIDTH, BUTTON_RESET, BUTTON_ROTATE_LEFT,
    BUTTON_ROTATE_RIGHT, BUTTON_SCALE_DOWN, BUTTON_SCALE_UP,
};
use crate::dom;
use crate::engines::SharedOrchestrator;
use ar_core::UserAction;
use web_sys as web;

pub use keyboard::wire_global_keydown;
pub use pointer::{wire_input_handlers, InputWiring};

/// Forward an action to the running engine. Skipped while a start is
/// still in progress.
pub fn apply(orch: &SharedOrchestrator, action: UserAction) -> bool {
    let Ok(mut orch) = orch.try_borrow_mut() else {
        log::debug!("[input] busy, dropping {:?}", action);
        return false;
    };
    let changed = orch.apply(action);
    if changed {
        log::debug!("[input] {:?}", action);
    }
    changed
}

const ACTION_BUTTONS: [(&str, UserAction); 9] = [
    (BUTTON_CONFIRM, UserAction::Confirm),
    (BUTTON_RESET, UserAction::Reset),
    (BUTTON_FIT_WIDTH, UserAction::FitWidth),
    (BUTTON_FIT_HEIGHT, UserAction::FitHeight),
    (BUTTON_FIT_WALL, UserAction::FitWall),
    (BUTTON_SCALE_UP, UserAction::Scale(1)),
    (BUTTON_SCALE_DOWN, UserAction::Scale(-1)),
    (BUTTON_ROTATE_LEFT, UserAction::Rotate(-1)),
    (BUTTON_ROTATE_RIGHT, UserAction::Rotate(1)),
];

/// Wire whichever action buttons the page provides.
pub fn wire_action_buttons(document: &web::Document, orch: &SharedOrchestrator) {
    let mut wired = 0;
    for (id, action) in ACTION_BUTTONS {
        let orch = orch.clone();
        if dom::add_click_listener(document, id, move || {
            apply(&orch, action);
        }) {
            wired += 1;
        }
    }
    log::info!("[input] {} action buttons wired", wired);
}
