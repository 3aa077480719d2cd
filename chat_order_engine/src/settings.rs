use chrono::Weekday;

/// All user-facing copy, overridable per install. Placeholders in curly braces (`{name}`, `{summary}`) are filled in
/// by the dispatcher with a plain string replace.
#[derive(Clone, Debug)]
pub struct Prompts {
    pub greeting: String,
    pub ask_phone: String,
    pub invalid_phone: String,
    pub already_registered: String,
    pub customer_linked: String,
    pub customer_created: String,
    pub customer_not_found: String,
    pub registration_failed: String,
    pub order_guidance: String,
    pub confirm_order: String,
    pub confirm_reminder: String,
    pub order_created: String,
    pub order_failed: String,
    pub order_cancelled: String,
    pub points_balance: String,
    pub points_unregistered: String,
    pub menu_title: String,
    pub menu_empty: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            greeting: "Thanks for following us!".into(),
            ask_phone: "Please send your 10-digit phone number (digits only, no dashes).".into(),
            invalid_phone: "Please send a valid 10-digit phone number.".into(),
            already_registered: "Hello {name}! You are already registered.".into(),
            customer_linked: "Linked to customer {name}. Thank you!".into(),
            customer_created: "Created customer {name} and linked it to your chat account. Thank you!".into(),
            customer_not_found: "Customer not found. Please contact support, or type 'register' to sign up.".into(),
            registration_failed: "Sorry, we could not complete your registration right now. Please try again later."
                .into(),
            order_guidance: "We couldn't find any order lines. Send one item per line, e.g. 'Green Hug qty: 2'."
                .into(),
            confirm_order: "{summary}\nReply 'confirm' to place this order, or 'cancel' to discard it.".into(),
            confirm_reminder: "You have a pending order. Reply 'confirm' to place it or 'cancel' to discard it."
                .into(),
            order_created: "Order {id} created: {qty} items, {total} {currency}. Thank you!".into(),
            order_failed: "Sorry, we could not create your order right now. Your order is still pending, please try \
                           'confirm' again in a moment."
                .into(),
            order_cancelled: "Your pending order has been cancelled.".into(),
            points_balance: "{name}, you have {points} loyalty points.".into(),
            points_unregistered: "Please register first to check your points. Type 'register' to get started.".into(),
            menu_title: "Today's menu".into(),
            menu_empty: "The menu is empty right now. Please check back later.".into(),
        }
    }
}

/// Immutable per-request bot configuration. Resolved once (from the environment, in the server crate) and threaded
/// through `dispatch` explicitly; the engine holds no global state.
#[derive(Clone, Debug)]
pub struct BotSettings {
    /// Kill switch. When false, authenticated events are acknowledged but not processed.
    pub enabled: bool,
    /// When true, a parsed order waits in `PendingOrder` state for an explicit 'confirm'. When false, orders are
    /// committed as soon as they parse (and the customer is linked).
    pub require_confirmation: bool,
    pub loyalty_program: String,
    /// Orders are delivered on the next occurrence of this weekday strictly after the order date.
    pub delivery_weekday: Weekday,
    pub menu_limit: usize,
    pub order_keywords: Vec<String>,
    pub register_keywords: Vec<String>,
    pub menu_keywords: Vec<String>,
    pub points_keywords: Vec<String>,
    pub confirm_keywords: Vec<String>,
    pub cancel_keywords: Vec<String>,
    /// Phrases that mark the quantity part of an order line, e.g. "qty" or a localized equivalent. A following
    /// colon (half- or full-width) is tolerated and stripped.
    pub quantity_markers: Vec<String>,
    /// Phrases that mark a note line. The remainder of the line becomes the order note.
    pub note_markers: Vec<String>,
    pub prompts: Prompts,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            require_confirmation: true,
            loyalty_program: "Default Loyalty".into(),
            delivery_weekday: Weekday::Sat,
            menu_limit: 50,
            order_keywords: vec!["order".into(), "สั่งซื้อ".into()],
            register_keywords: vec!["register".into(), "สมัคร".into()],
            menu_keywords: vec!["menu".into(), "เมนู".into()],
            points_keywords: vec!["points".into(), "แต้ม".into()],
            confirm_keywords: vec!["confirm".into(), "ยืนยัน".into()],
            cancel_keywords: vec!["cancel".into(), "ยกเลิก".into()],
            quantity_markers: vec!["จำนวน".into(), "qty".into()],
            note_markers: vec!["หมายเหตุ".into(), "note".into()],
            prompts: Prompts::default(),
        }
    }
}

/// Split a configured keyword list on commas and newlines, dropping blanks. Matching elsewhere is case- and
/// whitespace-insensitive, so no normalization happens here.
pub fn parse_keyword_list(raw: &str) -> Vec<String> {
    raw.split(|c| c == ',' || c == '\n')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Fill a prompt template's placeholders. Unused placeholders are left alone.
pub fn render(template: &str, substitutions: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in substitutions {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}
