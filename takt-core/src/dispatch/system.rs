use takt_types::{SystemSettingsAction, SystemStateSwitch};

use super::events::DispatchEvent;
use crate::context::ProcessContext;
use crate::error::TransmissionError;
use crate::state::SystemState;

pub(super) fn dispatch_settings(
    action: &SystemSettingsAction,
    state: &SystemState,
    ctx: &ProcessContext,
    effects: &mut Vec<DispatchEvent>,
) -> Result<(), TransmissionError> {
    let mut settings = state.write_settings(ctx)?;
    match action {
        SystemSettingsAction::Rename(name) => {
            let name = name.trim();
            if name.is_empty() {
                return Err(TransmissionError::Validation("instance name is empty".into()));
            }
            settings.instance_name = name.to_string();
        }
        SystemSettingsAction::SetSessionTimeout(minutes) => {
            if *minutes == 0 {
                return Err(TransmissionError::Validation(
                    "session timeout must be at least one minute".into(),
                ));
            }
            settings.session_timeout_minutes = *minutes;
        }
        SystemSettingsAction::SetRecording(enabled) => {
            settings.recording_enabled = *enabled;
        }
        SystemSettingsAction::Replace(new_settings) => {
            if new_settings.instance_name.trim().is_empty() || new_settings.session_timeout_minutes == 0 {
                return Err(TransmissionError::Validation("replacement settings are invalid".into()));
            }
            *settings = new_settings.clone();
        }
    }
    effects.push(DispatchEvent::SettingsChanged);
    Ok(())
}

/// Enter or leave read-only mode. Leaving requires a status that permits
/// writes.
pub(super) fn dispatch_state_switch(
    switch: &SystemStateSwitch,
    ctx: &ProcessContext,
    effects: &mut Vec<DispatchEvent>,
) -> Result<(), TransmissionError> {
    if !switch.read_only && !switch.status.permits_writes() {
        return Err(TransmissionError::Validation(format!(
            "cannot leave read-only mode with license status {}",
            switch.status
        )));
    }

    ctx.set_system_state(switch.read_only, switch.status);
    if switch.read_only {
        log::warn!(
            target: "dispatch",
            "system is now read-only ({}, code {}): {}",
            switch.status,
            switch.status.code(),
            switch.reason
        );
    } else {
        log::info!(target: "dispatch", "system is writable again: {}", switch.reason);
    }

    effects.push(DispatchEvent::SystemStateSwitched {
        read_only: switch.read_only,
        status: switch.status,
        reason: switch.reason.clone(),
    });
    Ok(())
}
