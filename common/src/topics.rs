pub const TOPIC_STATE: &str = "roomctl/state";
pub const TOPIC_EVENTS: &str = "roomctl/events";

pub const TOPIC_SIM_TEMPERATURE: &str = "roomctl/sim/temperature";
pub const TOPIC_SIM_HUMIDITY: &str = "roomctl/sim/humidity";
pub const TOPIC_SIM_LIGHT: &str = "roomctl/sim/light";
pub const TOPIC_SIM_MASTER_SWITCH: &str = "roomctl/sim/master-switch";
pub const TOPIC_SIM_MAIN_LED_SWITCH: &str = "roomctl/sim/main-led-switch";
