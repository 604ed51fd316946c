use serde::Serialize;
use tracing::debug;

/// Header offset past which the header switches to its compact style.
const SCROLLED_THRESHOLD: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Section {
    Home,
    About,
    Projects,
    AiAdvancements,
    Contact,
}

impl Section {
    pub const ALL: [Section; 5] = [
        Section::Home,
        Section::About,
        Section::Projects,
        Section::AiAdvancements,
        Section::Contact,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::About => "about",
            Self::Projects => "projects",
            Self::AiAdvancements => "ai-advancements",
            Self::Contact => "contact",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Home => "Home",
            Self::About => "About",
            Self::Projects => "Projects",
            Self::AiAdvancements => "AI Advancements",
            Self::Contact => "Contact",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.id() == id)
    }
}

/// Header navigation state: active section, mobile menu and scroll style.
#[derive(Debug, Clone)]
pub struct Navigator {
    active: Section,
    menu_open: bool,
    scrolled: bool,
}

impl Default for Navigator {
    fn default() -> Self {
        Self {
            active: Section::Home,
            menu_open: false,
            scrolled: false,
        }
    }
}

impl Navigator {
    pub fn active(&self) -> Section {
        self.active
    }

    pub fn is_menu_open(&self) -> bool {
        self.menu_open
    }

    pub fn is_scrolled(&self) -> bool {
        self.scrolled
    }

    /// Bring the section with `id` into view. Unknown ids are ignored.
    pub fn scroll_to_section(&mut self, id: &str) -> Option<Section> {
        let section = Section::from_id(id);
        match section {
            Some(section) => {
                self.active = section;
                debug!("Scrolled to #{}", section.id());
            }
            None => debug!("No section #{id}; ignoring"),
        }
        section
    }

    /// A nav link click: scroll, then close the mobile menu.
    pub fn select_link(&mut self, id: &str) -> Option<Section> {
        let section = self.scroll_to_section(id);
        self.menu_open = false;
        section
    }

    pub fn toggle_menu(&mut self) {
        self.menu_open = !self.menu_open;
    }

    pub fn close_menu(&mut self) {
        self.menu_open = false;
    }

    pub fn on_scroll(&mut self, offset_y: f64) {
        self.scrolled = offset_y > SCROLLED_THRESHOLD;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_section_is_a_silent_no_op() {
        let mut nav = Navigator::default();
        nav.scroll_to_section("projects");
        assert_eq!(nav.scroll_to_section("blog"), None);
        assert_eq!(nav.active(), Section::Projects);
    }

    #[test]
    fn link_click_closes_menu() {
        let mut nav = Navigator::default();
        nav.toggle_menu();
        assert!(nav.is_menu_open());
        assert_eq!(nav.select_link("ai-advancements"), Some(Section::AiAdvancements));
        assert!(!nav.is_menu_open());
    }

    #[test]
    fn scrolled_after_ten_pixels() {
        let mut nav = Navigator::default();
        nav.on_scroll(10.0);
        assert!(!nav.is_scrolled());
        nav.on_scroll(10.5);
        assert!(nav.is_scrolled());
        nav.on_scroll(0.0);
        assert!(!nav.is_scrolled());
    }

    #[test]
    fn ids_round_trip() {
        for section in Section::ALL {
            assert_eq!(Section::from_id(section.id()), Some(section));
        }
    }
}
