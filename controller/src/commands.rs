use thiserror::Error;

use roomctl_common::{
    ConfigStore, ControlError, EventSink, RoomController, TimeOfDay, TimeWindow,
};

pub const MAX_TIMED_MINUTES: u64 = 1_440;

/// Every command path served by both builds; `/data` is served separately.
pub const COMMAND_ROUTES: [&str; 14] = [
    "/on-perm",
    "/off",
    "/on-1h",
    "/on-30m",
    "/on-timed",
    "/set-temp-on",
    "/set-temp-off",
    "/set-brightness",
    "/set-main-led-brightness",
    "/set-light-threshold",
    "/set-debounce-delay",
    "/set-night-window",
    "/toggle-main-led",
    "/toggle-master-switch",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    PermanentOn,
    Off,
    TimedOn { minutes: u64 },
    SetTempOn(f32),
    SetTempOff(f32),
    SetNightLedDuty(u32),
    SetMainLedDuty(u32),
    SetLightThreshold(u16),
    SetDebounceMs(u32),
    SetNightWindow(TimeWindow),
    ToggleMainLed,
    ToggleMasterSwitch,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("Missing '{0}' parameter")]
    Missing(&'static str),
    #[error("Invalid '{name}' parameter. {hint}")]
    Invalid {
        name: &'static str,
        hint: &'static str,
    },
    #[error("Unknown command path `{0}`")]
    UnknownPath(String),
    #[error(transparent)]
    Rejected(#[from] ControlError),
}

/// Parses a command path plus its query lookup. `param` is the transport's
/// query accessor so the axum and esp-idf servers share one grammar.
pub fn parse<'a, F>(path: &str, param: F) -> Result<Command, CommandError>
where
    F: Fn(&str) -> Option<&'a str>,
{
    let command = match path {
        "/on-perm" => Command::PermanentOn,
        "/off" => Command::Off,
        "/on-1h" => Command::TimedOn { minutes: 60 },
        "/on-30m" => Command::TimedOn { minutes: 30 },
        "/on-timed" => {
            let minutes: u64 = number(&param, "minutes", "Must be between 1 and 1440.")?;
            if !(1..=MAX_TIMED_MINUTES).contains(&minutes) {
                return Err(CommandError::Invalid {
                    name: "minutes",
                    hint: "Must be between 1 and 1440.",
                });
            }
            Command::TimedOn { minutes }
        }
        "/set-temp-on" => Command::SetTempOn(number(&param, "value", "Must be a number.")?),
        "/set-temp-off" => Command::SetTempOff(number(&param, "value", "Must be a number.")?),
        "/set-brightness" => {
            Command::SetNightLedDuty(number(&param, "value", "Must be between 0 and 8191.")?)
        }
        "/set-main-led-brightness" => {
            Command::SetMainLedDuty(number(&param, "value", "Must be between 0 and 8191.")?)
        }
        "/set-light-threshold" => {
            Command::SetLightThreshold(number(&param, "value", "Must be between 0 and 65535.")?)
        }
        "/set-debounce-delay" => {
            Command::SetDebounceMs(number(&param, "value", "Must be a whole number of ms.")?)
        }
        "/set-night-window" => {
            let start = time_of_day(&param, "start")?;
            let end = time_of_day(&param, "end")?;
            Command::SetNightWindow(TimeWindow::new(start, end))
        }
        "/toggle-main-led" => Command::ToggleMainLed,
        "/toggle-master-switch" => Command::ToggleMasterSwitch,
        other => return Err(CommandError::UnknownPath(other.to_string())),
    };
    Ok(command)
}

/// Applies `command` to the controller. Rejections leave state untouched.
pub fn execute<S, E>(
    controller: &mut RoomController<S, E>,
    command: Command,
    now_ms: u64,
) -> Result<(), CommandError>
where
    S: ConfigStore,
    E: EventSink,
{
    match command {
        Command::PermanentOn => {
            controller.command_permanent_on(now_ms);
        }
        Command::Off => {
            controller.command_off();
        }
        Command::TimedOn { minutes } => {
            controller.command_timed_on(now_ms, minutes * 60_000)?;
        }
        Command::SetTempOn(value) => {
            controller.set_on_threshold(value)?;
        }
        Command::SetTempOff(value) => {
            controller.set_off_threshold(value)?;
        }
        Command::SetNightLedDuty(duty) => {
            controller.set_night_led_duty(duty)?;
        }
        Command::SetMainLedDuty(duty) => {
            controller.set_main_led_duty(duty)?;
        }
        Command::SetLightThreshold(value) => controller.set_light_threshold(value),
        Command::SetDebounceMs(ms) => controller.set_debounce_ms(ms),
        Command::SetNightWindow(window) => controller.set_night_window(window),
        Command::ToggleMainLed => {
            controller.toggle_main_led();
        }
        Command::ToggleMasterSwitch => {
            controller.toggle_master_switch();
        }
    }
    Ok(())
}

fn number<'a, T, F>(param: &F, name: &'static str, hint: &'static str) -> Result<T, CommandError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<&'a str>,
{
    let raw = param(name).ok_or(CommandError::Missing(name))?;
    raw.trim()
        .parse::<T>()
        .map_err(|_| CommandError::Invalid { name, hint })
}

fn time_of_day<'a, F>(param: &F, name: &'static str) -> Result<TimeOfDay, CommandError>
where
    F: Fn(&str) -> Option<&'a str>,
{
    let raw = param(name).ok_or(CommandError::Missing(name))?;
    TimeOfDay::parse(raw.trim()).map_err(|_| CommandError::Invalid {
        name,
        hint: "Use HH:MM.",
    })
}
