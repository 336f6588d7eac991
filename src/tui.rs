use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Span;
use rust_decimal::Decimal;

use crate::fmt::money;

pub const HEADER_STYLE: Style = Style::new()
    .fg(Color::Yellow)
    .add_modifier(Modifier::BOLD);

pub const FOOTER_STYLE: Style = Style::new().fg(Color::DarkGray);

pub const AMOUNT_POS_STYLE: Style = Style::new().fg(Color::Rgb(80, 220, 100));
pub const AMOUNT_NEG_STYLE: Style = Style::new().fg(Color::Red);

pub const SELECTED_STYLE: Style = Style::new()
    .bg(Color::Rgb(40, 40, 60))
    .add_modifier(Modifier::BOLD);

pub const FIELD_LABEL_STYLE: Style = Style::new().fg(Color::Cyan);

pub const STATUS_STYLE: Style = Style::new()
    .fg(Color::Yellow)
    .add_modifier(Modifier::ITALIC);

/// Format a signed amount as a colored Span (green for income, red for
/// expense).
pub fn money_span(amount: Decimal) -> Span<'static> {
    let style = if amount.is_sign_negative() && !amount.is_zero() {
        AMOUNT_NEG_STYLE
    } else {
        AMOUNT_POS_STYLE
    };
    Span::styled(money(amount), style)
}

/// Restore the terminal before the default panic handler runs, so a panic
/// inside the draw loop does not leave the shell in raw mode.
pub fn install_panic_hook() {
    let hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        ratatui::restore();
        hook(info);
    }));
}
