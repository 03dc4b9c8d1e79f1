//! `daybook meetings`: the day's meetings with prep checklists.

use chrono::{Local, NaiveDate, TimeZone};
use tracing::{debug, warn};

use daybook_core::Meeting;
use daybook_providers::{
    CalendarProvider, ErrorProvider, ProviderError, fetch_day, normalize_meetings,
};

use crate::commands::Context;
use crate::config::ClientConfig;
use crate::error::ClientResult;

pub async fn run(ctx: &Context, date: Option<NaiveDate>) -> ClientResult<()> {
    let date = date.unwrap_or_else(|| Local::now().date_naive());
    let provider = build_provider(&ctx.config);
    let meetings = day_meetings(provider.as_ref(), date, &Local).await?;
    ctx.emit(&meetings, || ctx.renderer.meetings(&meetings))
}

/// Fetches the local day `date` and normalizes it into meetings.
pub async fn day_meetings<Tz>(
    provider: &dyn CalendarProvider,
    date: NaiveDate,
    tz: &Tz,
) -> ClientResult<Vec<Meeting>>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let events = fetch_day(provider, date, tz).await?;
    let meetings = normalize_meetings(&events, tz);
    debug!(%date, events = events.len(), meetings = meetings.len(), "built meeting list");
    Ok(meetings)
}

/// The configured calendar, or a stand-in that explains what is missing.
fn build_provider(config: &ClientConfig) -> Box<dyn CalendarProvider> {
    #[cfg(feature = "google")]
    {
        let Some(ref settings) = config.google else {
            return not_configured(
                "no calendar configured; run 'daybook auth google' to connect Google Calendar",
            );
        };
        match settings
            .to_provider_config()
            .map_err(ProviderError::configuration)
            .and_then(daybook_providers::google::GoogleProvider::new)
        {
            Ok(provider) => {
                if !provider.is_authenticated() {
                    debug!("Google token missing or expired, a refresh will be attempted");
                }
                Box::new(provider)
            }
            Err(e) => {
                warn!(error = %e, "could not set up Google Calendar");
                Box::new(ErrorProvider::new("google", e))
            }
        }
    }

    #[cfg(not(feature = "google"))]
    {
        let _ = config;
        not_configured("this build has no calendar support")
    }
}

fn not_configured(message: &str) -> Box<dyn CalendarProvider> {
    Box::new(ErrorProvider::new(
        "calendar",
        ProviderError::configuration(message),
    ))
}

#[cfg(all(test, feature = "google"))]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use chrono::FixedOffset;
    use daybook_core::MeetingType;
    use daybook_providers::google::{GoogleConfig, GoogleProvider, OAuthCredentials};
    use daybook_providers::{TokenInfo, TokenStorage};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn unconfigured_calendar_points_to_auth() {
        let provider = build_provider(&ClientConfig::default());
        let date = NaiveDate::from_ymd_opt(2024, 3, 11).unwrap();
        let err = day_meetings(provider.as_ref(), date, &Local).await.unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
        assert!(err.to_string().contains("daybook auth google"));
    }

    #[tokio::test]
    async fn fetches_day_and_normalizes() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("tokens.json");
        let credentials = OAuthCredentials::new("id.apps.googleusercontent.com", "secret");
        let config = GoogleConfig::new(credentials)
            .with_token_path(&token_path)
            .with_api_base_url(server.uri());
        TokenStorage::<TokenInfo>::new(&token_path)
            .set(TokenInfo::new(
                "access",
                Some("refresh".to_string()),
                Some(3600),
                vec![GoogleConfig::DEFAULT_SCOPE.to_string()],
            ))
            .unwrap();
        let provider = GoogleProvider::new(config).unwrap();

        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .and(query_param("timeMin", "2024-03-10T23:00:00+00:00"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {
                        "id": "e1",
                        "summary": "Technical interview with Acme",
                        "start": {"dateTime": "2024-03-11T10:30:00+01:00"},
                        "end": {"dateTime": "2024-03-11T11:30:00+01:00"},
                        "attendees": [{"email": "jane@acme.io", "displayName": "Jane"}]
                    },
                    {
                        "id": "e2",
                        "summary": "Busy",
                        "start": {"dateTime": "2024-03-11T12:00:00+01:00"},
                        "end": {"dateTime": "2024-03-11T13:00:00+01:00"}
                    },
                    {
                        "id": "e3",
                        "summary": "Holiday",
                        "start": {"date": "2024-03-11"},
                        "end": {"date": "2024-03-12"}
                    }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tz = FixedOffset::east_opt(3600).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 11).unwrap();
        let meetings = day_meetings(&provider, date, &tz).await.unwrap();

        assert_eq!(meetings.len(), 1);
        assert_eq!(meetings[0].time, "10:30");
        assert_eq!(meetings[0].meeting_type, MeetingType::TechnicalInterview);
        assert_eq!(meetings[0].company, "acme");
        assert!(meetings[0].contributes_to_goal);
    }
}
