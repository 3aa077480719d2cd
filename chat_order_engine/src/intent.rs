use std::collections::HashSet;

use cog_common::helpers::normalize_key;

use crate::settings::BotSettings;

/// The classified purpose of a user message. Classification is strictly keyword-based; there is no NLU here and
/// there should never be any.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Intent {
    Register,
    Menu,
    Order,
    Points,
    Confirm,
    Cancel,
}

/// Normalized trigger phrases for each intent, computed once per dispatch from the raw keyword lists in
/// [`BotSettings`]. Matching is exact on the normalized (lowercased, whitespace-stripped) message, which keeps
/// "Menu", "menu" and " m e n u " equivalent without any scattered string comparisons.
#[derive(Clone, Debug)]
pub struct IntentTable {
    register: HashSet<String>,
    menu: HashSet<String>,
    order: HashSet<String>,
    points: HashSet<String>,
    confirm: HashSet<String>,
    cancel: HashSet<String>,
}

fn normalized_set(raw: &[String]) -> HashSet<String> {
    raw.iter().map(|s| normalize_key(s)).filter(|s| !s.is_empty()).collect()
}

impl IntentTable {
    pub fn from_settings(settings: &BotSettings) -> Self {
        Self {
            register: normalized_set(&settings.register_keywords),
            menu: normalized_set(&settings.menu_keywords),
            order: normalized_set(&settings.order_keywords),
            points: normalized_set(&settings.points_keywords),
            confirm: normalized_set(&settings.confirm_keywords),
            cancel: normalized_set(&settings.cancel_keywords),
        }
    }

    /// Classify a whole message. `text` may be raw; it is normalized here.
    pub fn classify(&self, text: &str) -> Option<Intent> {
        let key = normalize_key(text);
        if key.is_empty() {
            return None;
        }
        // Precedence only matters if an installer maps one phrase to two intents; first match wins in this order.
        [
            (Intent::Confirm, &self.confirm),
            (Intent::Cancel, &self.cancel),
            (Intent::Register, &self.register),
            (Intent::Menu, &self.menu),
            (Intent::Points, &self.points),
            (Intent::Order, &self.order),
        ]
        .into_iter()
        .find_map(|(intent, set)| set.contains(&key).then_some(intent))
    }

    /// True if the given line is an order banner ("order", localized equivalents). The parser uses this to skip a
    /// leading banner line, and the dispatcher to detect order intent on multi-line messages.
    pub fn is_order_banner(&self, line: &str) -> bool {
        self.order.contains(&normalize_key(line))
    }

    pub fn is_confirm(&self, text: &str) -> bool {
        self.classify(text) == Some(Intent::Confirm)
    }

    pub fn is_cancel(&self, text: &str) -> bool {
        self.classify(text) == Some(Intent::Cancel)
    }
}
