use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ApiError, FieldErrors};
use crate::models::{
    known_runs, RaceRun, RaceRunForm, RaceRunId, Racer, RacerForm, RacerId, Soapbox, SoapboxForm, SoapboxId, Team,
    TeamForm, TeamId,
};
use crate::session::Session;
use crate::tokens::TokenStore;
use crate::transport::{HttpRequest, HttpResponse, Transport};

/// Typed endpoints of the event backend. Every call goes through the
/// session, so expired access tokens are refreshed transparently.
pub struct ApiClient<T: Transport, S: TokenStore> {
    session: Session<T, S>,
}

impl<T: Transport, S: TokenStore> ApiClient<T, S> {
    pub fn new(session: Session<T, S>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Session<T, S> {
        &self.session
    }

    // Teams

    pub async fn teams(&self) -> Result<Vec<Team>, ApiError> {
        self.fetch(HttpRequest::get("teams/")).await
    }

    pub async fn team(&self, id: TeamId) -> Result<Team, ApiError> {
        self.fetch(HttpRequest::get(format!("teams/{id}/"))).await
    }

    pub async fn create_team(&self, form: &TeamForm) -> Result<Team, ApiError> {
        self.fetch(HttpRequest::post("teams/", to_json(form)?)).await
    }

    pub async fn update_team(&self, id: TeamId, form: &TeamForm) -> Result<Team, ApiError> {
        self.fetch(HttpRequest::put(format!("teams/{id}/"), to_json(form)?)).await
    }

    pub async fn delete_team(&self, id: TeamId) -> Result<(), ApiError> {
        self.execute(HttpRequest::delete(format!("teams/{id}/"))).await
    }

    // Soapboxes

    pub async fn soapboxes(&self) -> Result<Vec<Soapbox>, ApiError> {
        self.fetch(HttpRequest::get("soapboxes/")).await
    }

    pub async fn create_soapbox(&self, form: &SoapboxForm) -> Result<Soapbox, ApiError> {
        self.fetch(HttpRequest::post("soapboxes/", to_json(form)?)).await
    }

    pub async fn update_soapbox(&self, id: SoapboxId, form: &SoapboxForm) -> Result<Soapbox, ApiError> {
        self.fetch(HttpRequest::put(format!("soapboxes/{id}/"), to_json(form)?)).await
    }

    pub async fn delete_soapbox(&self, id: SoapboxId) -> Result<(), ApiError> {
        self.execute(HttpRequest::delete(format!("soapboxes/{id}/"))).await
    }

    // Racers

    /// `params` become query parameters, e.g. `("soapbox_class", "LJ")`.
    pub async fn racers(&self, params: &[(&str, String)]) -> Result<Vec<Racer>, ApiError> {
        let request = params
            .iter()
            .fold(HttpRequest::get("racers/"), |rq, (k, v)| rq.with_query(k, v));
        self.fetch(request).await
    }

    pub async fn racer(&self, id: RacerId) -> Result<Racer, ApiError> {
        self.fetch(HttpRequest::get(format!("racers/{id}/"))).await
    }

    pub async fn create_racer(&self, form: &RacerForm) -> Result<Racer, ApiError> {
        self.fetch(HttpRequest::post("racers/", to_json(form)?)).await
    }

    pub async fn update_racer(&self, id: RacerId, form: &RacerForm) -> Result<Racer, ApiError> {
        self.fetch(HttpRequest::put(format!("racers/{id}/"), to_json(form)?)).await
    }

    pub async fn delete_racer(&self, id: RacerId) -> Result<(), ApiError> {
        self.execute(HttpRequest::delete(format!("racers/{id}/"))).await
    }

    // Race runs

    pub async fn race_runs(&self, params: &[(&str, String)]) -> Result<Vec<RaceRun>, ApiError> {
        let request = params
            .iter()
            .fold(HttpRequest::get("raceruns/"), |rq, (k, v)| rq.with_query(k, v));
        let runs: Vec<serde_json::Value> = self.fetch(request).await?;
        Ok(known_runs(runs))
    }

    pub async fn create_race_run(&self, form: &RaceRunForm) -> Result<RaceRun, ApiError> {
        self.fetch(HttpRequest::post("raceruns/", to_json(form)?)).await
    }

    pub async fn update_race_run(&self, id: RaceRunId, form: &RaceRunForm) -> Result<RaceRun, ApiError> {
        self.fetch(HttpRequest::put(format!("raceruns/{id}/"), to_json(form)?)).await
    }

    pub async fn delete_race_run(&self, id: RaceRunId) -> Result<(), ApiError> {
        self.execute(HttpRequest::delete(format!("raceruns/{id}/"))).await
    }

    async fn fetch<R: DeserializeOwned>(&self, request: HttpRequest) -> Result<R, ApiError> {
        let response = checked(self.session.authorized_request(request).await?)?;
        Ok(serde_json::from_str(&response.body)?)
    }

    async fn execute(&self, request: HttpRequest) -> Result<(), ApiError> {
        checked(self.session.authorized_request(request).await?).map(|_| ())
    }
}

fn to_json<P: Serialize>(payload: &P) -> Result<serde_json::Value, ApiError> {
    Ok(serde_json::to_value(payload)?)
}

/// Map non-2xx responses onto the error taxonomy. 400 bodies carry the
/// backend's field messages, which are kept verbatim.
fn checked(response: HttpResponse) -> Result<HttpResponse, ApiError> {
    match response.status {
        s if (200..300).contains(&s) => Ok(response),
        400 => {
            let fields = FieldErrors::from_body(&response.body);
            if fields.is_empty() {
                Err(ApiError::Status {
                    status: 400,
                    body: response.body,
                })
            } else {
                Err(ApiError::Validation(fields))
            }
        }
        status => Err(ApiError::Status {
            status,
            body: response.body,
        }),
    }
}
