use serenity::{all::ButtonStyle, builder::{CreateActionRow, CreateButton}};

/// IDs personalizados para los botones del panel
pub mod button_ids {
    pub const PLAY: &str = "music_play";
    pub const PAUSE: &str = "music_pause";
    pub const SKIP: &str = "music_skip";
    pub const STOP: &str = "music_stop";
    pub const LOOP: &str = "music_loop";
}

/// Acción pedida desde un botón del panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelAction {
    Resume,
    Pause,
    Skip,
    Stop,
    ToggleLoop,
}

impl PanelAction {
    pub fn from_custom_id(custom_id: &str) -> Option<Self> {
        match custom_id {
            button_ids::PLAY => Some(Self::Resume),
            button_ids::PAUSE => Some(Self::Pause),
            button_ids::SKIP => Some(Self::Skip),
            button_ids::STOP => Some(Self::Stop),
            button_ids::LOOP => Some(Self::ToggleLoop),
            _ => None,
        }
    }

    pub fn custom_id(self) -> &'static str {
        match self {
            Self::Resume => button_ids::PLAY,
            Self::Pause => button_ids::PAUSE,
            Self::Skip => button_ids::SKIP,
            Self::Stop => button_ids::STOP,
            Self::ToggleLoop => button_ids::LOOP,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Resume => "▶️ Play",
            Self::Pause => "⏸️ Pause",
            Self::Skip => "⏭️ Skip",
            Self::Stop => "⏹️ Stop",
            Self::ToggleLoop => "🔁 Loop",
        }
    }
}

const PANEL_ORDER: [PanelAction; 5] = [
    PanelAction::Resume,
    PanelAction::Pause,
    PanelAction::Skip,
    PanelAction::Stop,
    PanelAction::ToggleLoop,
];

/// Fila de controles del panel.
pub fn panel_controls() -> Vec<CreateActionRow> {
    let buttons = PANEL_ORDER
        .iter()
        .map(|action| {
            CreateButton::new(action.custom_id())
                .label(action.label())
                .style(ButtonStyle::Secondary)
        })
        .collect();

    vec![CreateActionRow::Buttons(buttons)]
}
