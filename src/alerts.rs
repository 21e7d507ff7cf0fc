use crate::i18n::Translator;

/// How long a notice stays on screen.
pub const NOTICE_MS: u64 = 4_000;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NoticeKind {
    Info,
    Success,
    Error,
    Record,
}

/// Non-blocking status line. Holds a translation key so a language switch
/// re-renders it in the new language.
#[derive(Clone, Debug, PartialEq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub key: &'static str,
    pub detail: Option<String>,
    shown_ms: u64,
}

impl Notice {
    pub fn new(kind: NoticeKind, key: &'static str, now_ms: u64) -> Self {
        Self {
            kind,
            key,
            detail: None,
            shown_ms: now_ms,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.shown_ms) >= NOTICE_MS
    }

    pub fn text(&self, tr: &Translator) -> String {
        match &self.detail {
            Some(detail) => format!("{} {}", tr.tr(self.key), detail),
            None => tr.tr(self.key).into_owned(),
        }
    }
}

/// Logs the notice the way it is shown and returns it.
pub fn fire_alert(notice: Notice) -> Notice {
    match notice.kind {
        NoticeKind::Error => log::warn!("{} {}", notice.key, notice.detail.as_deref().unwrap_or("")),
        _ => log::info!("{} {}", notice.key, notice.detail.as_deref().unwrap_or("")),
    }
    notice
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::Language;

    #[test]
    fn test_notice_text_and_expiry() {
        let tr = Translator::new(Language::En);
        let notice = Notice::new(NoticeKind::Success, "pending-solve-saved", 1_000).with_detail("3x3");
        assert_eq!(notice.text(&tr), "Pending ??? solve saved to 3x3");
        assert!(!notice.expired(4_999));
        assert!(notice.expired(5_000));

        let plain = Notice::new(NoticeKind::Record, "new-record", 0);
        assert_eq!(plain.text(&tr), "NEW RECORD!");
    }
}
