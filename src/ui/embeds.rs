use serenity::{
    all::Colour,
    builder::{CreateActionRow, CreateEmbed, CreateMessage, EditMessage},
};

use super::{
    buttons::panel_controls,
    panel::{PanelView, BRAND_COLOUR, BRAND_TITLE, BRAND_URL},
};

pub const BRAND: Colour = Colour::from_rgb(BRAND_COLOUR.0, BRAND_COLOUR.1, BRAND_COLOUR.2);

/// Embed con la marca del bot para una vista de panel.
pub fn panel_embed(view: &PanelView) -> CreateEmbed {
    view.fields.iter().fold(
        CreateEmbed::new()
            .title(BRAND_TITLE)
            .url(BRAND_URL)
            .colour(BRAND)
            .description(&view.description),
        |embed, field| embed.field(&field.name, &field.value, field.inline),
    )
}

fn components(view: &PanelView) -> Vec<CreateActionRow> {
    if view.controls {
        panel_controls()
    } else {
        Vec::new()
    }
}

pub fn create_message(view: &PanelView) -> CreateMessage {
    CreateMessage::new()
        .embed(panel_embed(view))
        .components(components(view))
}

/// Reemplaza embed y botones; una vista sin controles los quita.
pub fn edit_message(view: &PanelView) -> EditMessage {
    EditMessage::new()
        .embed(panel_embed(view))
        .components(components(view))
}
