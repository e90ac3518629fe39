use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Hosts whose listings are rendered client-side or sit behind bot checks.
const JS_HEAVY_HOSTS: &[&str] = &["meetup.com", "eventbrite.com", "engage.isaca.org"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub org: String,
    pub group: String,
    pub url: String,
}

impl Source {
    pub fn new(org: &str, group: &str, url: &str) -> Self {
        Self {
            org: org.to_string(),
            group: group.to_string(),
            url: url.to_string(),
        }
    }

    /// `org / group`, used to label log entries.
    pub fn id(&self) -> String {
        format!("{} / {}", self.org, self.group)
    }

    pub fn needs_js_rendering(&self) -> bool {
        let lower = self.url.to_lowercase();
        JS_HEAVY_HOSTS.iter().any(|h| lower.contains(h))
    }
}

const DEFAULT_SOURCES: &[(&str, &str, &str)] = &[
    ("ONE-ISAC", "Event Calendar", "https://oneisac.org/event-calendar/"),
    ("ONE-ISAC", "Industry Events", "https://oneisac.org/industry-events/"),
    ("ISSA", "NTX Dallas", "https://www.ntxissa.org/about/calendar-of-events"),
    ("ISSA", "NTX Dallas", "https://www.ntxissa.org/upcoming"),
    ("ISSA", "Austin Chapter", "https://www.austinissa.org/events"),
    ("ISSA", "South Texas (Houston)", "https://southtexasissa.starchapter.com/meetinginfo.php"),
    ("ISSA", "Alamo (San Antonio)", "https://www.alamoissa.org/event-list"),
    ("ISACA", "North Texas Chapter", "https://engage.isaca.org/northtexaschapter/events/calendar"),
    ("ISACA", "Austin Chapter", "https://engage.isaca.org/austinchapter/events/calendar"),
    ("ISACA", "Greater Houston Chapter", "https://engage.isaca.org/greaterhoustonchapter/events/calendar"),
    ("ISACA", "San Antonio Chapter", "https://engage.isaca.org/sanantoniochapter/events/calendar"),
    ("(ISC)²", "DFW Chapter", "https://isc2chapter-dfw.org/events/future-events"),
    ("(ISC)²", "Houston Chapter", "https://www.isc2houstonchapter.org/events"),
    ("(ISC)²", "Alamo (San Antonio)", "https://alamoisc2.org/events"),
    ("Meetup", "Dallas Hackers Association", "https://www.meetup.com/dallas-hackers-association/"),
    ("Meetup", "OWASP Dallas", "https://www.meetup.com/dallas-the-open-web-application-security-project-meetup/"),
    ("Meetup", "dc512 ATX", "https://www.meetup.com/dc512atx/"),
    ("Meetup", "OWASP Austin", "https://www.meetup.com/owasp-austin-chapter/"),
    ("Meetup", "Austin Application Security", "https://www.meetup.com/austin-application-security-meetup-group/"),
    ("Meetup", "OWASP Houston", "https://www.meetup.com/owasp-houston/"),
    ("Meetup", "OWASP San Antonio", "https://www.meetup.com/owasp-sanantonio/"),
    ("Community", "DCGSA TX", "https://dcgsatx.com/"),
    ("Directory", "InfoSec-Conferences Texas", "https://infosec-conferences.com/us-state/texas"),
    ("Directory", "All Conference Alert TX", "https://www.allconferencealert.com/texas/information-security-conference.html"),
    ("Directory", "GovEvents", "https://govevents.com/"),
    ("Conference", "FutureCon Dallas", "https://futureconevents.com/events/dallas-tx-2026/"),
    ("Conference", "ISMG Dallas Summit", "https://ismg.events/summit/cybersecurity-summit-datasecurity-2025/"),
    ("Conference", "CS4CA USA", "https://usa.cs4ca.com/"),
    ("Conference", "Industrial Defender Events", "https://www.industrialdefender.com/events"),
    ("Conference", "API Cybersecurity Conf", "https://events.api.org/20th-annual-api-cybersecurity-conference-for-the-oil-and-natural-gas-industry/"),
    ("Conference", "Lone Star Cyber Summit", "https://lonestar.cyberseries.io/"),
    ("Conference", "UTINFOSEC", "https://www.utsystem.edu/offices/information-security/utinfosec"),
    ("Conference", "CybersecuritySummit.com", "https://cybersecuritysummit.com/"),
    ("Directory", "Eventbrite Austin Cybersecurity", "https://www.eventbrite.com/d/tx--austin/cyber-security/"),
    ("Directory", "Meetup San Antonio Cybersecurity Search", "https://www.meetup.com/find/us--tx--san-antonio/cybersecurity/"),
    ("Directory", "CyberRisk Alliance Events", "https://cyberriskalliance.com/events"),
];

pub fn default_sources() -> Vec<Source> {
    DEFAULT_SOURCES
        .iter()
        .map(|(org, group, url)| Source::new(org, group, url))
        .collect()
}

/// Built-in list, or the JSON array at `path` when given.
pub fn load_sources(path: Option<&Path>) -> Result<Vec<Source>> {
    let Some(path) = path else {
        return Ok(default_sources());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read sources file {}", path.display()))?;
    let sources: Vec<Source> = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid sources file {}", path.display()))?;
    info!(count = sources.len(), path = %path.display(), "Loaded sources file");
    Ok(sources)
}
