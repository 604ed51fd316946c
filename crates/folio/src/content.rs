use once_cell::sync::Lazy;
use serde::Serialize;

pub const FALLBACK_ABOUT_TEXT: &str = "As a passionate engineer operating at the intersection of cybersecurity and artificial intelligence, I thrive on building intelligent systems that are both resilient and secure. My work involves developing advanced threat detection models, creating robust AI-driven security protocols, and contributing to open-source intelligence tools. I am dedicated to pushing the boundaries of technology to solve complex, real-world problems and am always eager to connect with fellow innovators.";

pub const OWNER_NAME: &str = "J. Doe";
pub const CONTACT_EMAIL: &str = "contact@example.com";
const MAIL_SUBJECT: &str = "Project Inquiry";
const MAIL_BODY: &str = "Hi J.,\r\n\r\nI'd like to discuss...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Category {
    All,
    #[serde(rename = "AI/ML")]
    AiMl,
    Cybersecurity,
    Web,
    Data,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::All,
        Category::AiMl,
        Category::Cybersecurity,
        Category::Web,
        Category::Data,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::All => "All",
            Self::AiMl => "AI/ML",
            Self::Cybersecurity => "Cybersecurity",
            Self::Web => "Web",
            Self::Data => "Data",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| {
                c.label().to_ascii_lowercase() == wanted
                    || (*c == Self::AiMl && matches!(wanted.as_str(), "ai" | "ml" | "ai-ml"))
            })
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|c| c.label()).collect();
                format!("unknown category '{s}' (expected one of: {})", names.join(", "))
            })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Project {
    pub id: u32,
    pub title: &'static str,
    pub description: &'static str,
    pub tags: &'static [&'static str],
    pub categories: &'static [Category],
    pub image_url: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_url: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_url: Option<&'static str>,
}

pub static PROJECTS: Lazy<Vec<Project>> = Lazy::new(|| {
    vec![
        Project {
            id: 1,
            title: "AI Agents: Autonomous Threat Hunters",
            description: "A framework for deploying autonomous AI agents that proactively hunt for network vulnerabilities and anomalies using reinforcement learning.",
            tags: &["Python", "TensorFlow", "Scapy", "Cybersecurity"],
            categories: &[Category::AiMl, Category::Cybersecurity],
            image_url: "https://picsum.photos/seed/aiagent/400/300",
            live_url: Some("#"),
            github_url: Some("#"),
        },
        Project {
            id: 2,
            title: "Cybersecurity Lab Orchestrator",
            description: "A web-based platform for dynamically provisioning and managing virtual cybersecurity lab environments for training and research.",
            tags: &["Docker", "React", "Node.js", "Ansible"],
            categories: &[Category::Cybersecurity, Category::Web],
            image_url: "https://picsum.photos/seed/cyberlab/400/300",
            live_url: None,
            github_url: Some("#"),
        },
        Project {
            id: 3,
            title: "OSINT Toolkit Aggregator",
            description: "A powerful command-line tool that aggregates results from various open-source intelligence (OSINT) APIs into a unified, actionable report.",
            tags: &["Go", "API", "CLI", "OSINT"],
            categories: &[Category::Cybersecurity, Category::Data],
            image_url: "https://picsum.photos/seed/osint/400/300",
            live_url: None,
            github_url: Some("#"),
        },
        Project {
            id: 4,
            title: "Sports Analytics Dashboard",
            description: "An interactive dashboard visualizing real-time sports statistics, using machine learning to predict game outcomes and player performance.",
            tags: &["D3.js", "Python", "Flask", "Scikit-learn"],
            categories: &[Category::Data, Category::AiMl],
            image_url: "https://picsum.photos/seed/sports/400/300",
            live_url: Some("#"),
            github_url: None,
        },
        Project {
            id: 5,
            title: "WebScanAI: Vulnerability Scanner",
            description: "A web application that leverages a custom-trained AI model to scan websites for common security vulnerabilities like XSS and SQL injection.",
            tags: &["Vue.js", "FastAPI", "PyTorch", "OWASP"],
            categories: &[Category::Web, Category::AiMl, Category::Cybersecurity],
            image_url: "https://picsum.photos/seed/webscan/400/300",
            live_url: Some("#"),
            github_url: Some("#"),
        },
        Project {
            id: 6,
            title: "SigmaLearn: E-Learning Platform",
            description: "A full-stack e-learning platform with course management, video streaming, and adaptive learning paths powered by a recommendation engine.",
            tags: &["React", "TypeScript", "GraphQL", "Prisma"],
            categories: &[Category::Web, Category::Data],
            image_url: "https://picsum.photos/seed/sigmalearn/400/300",
            live_url: Some("#"),
            github_url: Some("#"),
        },
    ]
});

/// Projects shown under `category`, in catalogue order.
pub fn filter_projects(category: Category) -> Vec<&'static Project> {
    PROJECTS
        .iter()
        .filter(|p| category == Category::All || p.categories.contains(&category))
        .collect()
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SocialLink {
    pub name: &'static str,
    pub url: &'static str,
}

pub const SOCIAL_LINKS: [SocialLink; 3] = [
    SocialLink { name: "GitHub", url: "https://github.com" },
    SocialLink { name: "LinkedIn", url: "https://linkedin.com" },
    SocialLink { name: "Twitter/X", url: "https://x.com" },
];

/// `mailto:` link with the preset subject and greeting.
pub fn mailto_link() -> String {
    format!(
        "mailto:{CONTACT_EMAIL}?subject={}&body={}",
        percent_encode(MAIL_SUBJECT),
        percent_encode(MAIL_BODY)
    )
}

fn percent_encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b',' | b'\'' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_returns_every_project() {
        assert_eq!(filter_projects(Category::All).len(), 6);
    }

    #[test]
    fn filter_keeps_catalogue_order() {
        let ids: Vec<u32> = filter_projects(Category::AiMl).iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 4, 5]);
        let ids: Vec<u32> = filter_projects(Category::Data).iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![3, 4, 6]);
    }

    #[test]
    fn category_parses_labels() {
        assert_eq!("ai/ml".parse::<Category>().unwrap(), Category::AiMl);
        assert_eq!("Web".parse::<Category>().unwrap(), Category::Web);
        assert!("games".parse::<Category>().is_err());
    }

    #[test]
    fn mailto_encodes_subject_and_body() {
        let link = mailto_link();
        assert!(link.starts_with("mailto:contact@example.com?subject=Project%20Inquiry&body=Hi%20J.,"));
        assert!(link.contains("%0D%0A%0D%0A"));
    }

    #[test]
    fn projects_serialize_category_labels() {
        let json = serde_json::to_value(&PROJECTS[0]).unwrap();
        assert_eq!(json["categories"][0], "AI/ML");
        assert!(json.get("live_url").is_some());
        let json = serde_json::to_value(&PROJECTS[3]).unwrap();
        assert!(json.get("github_url").is_none());
    }
}
