use airwave_proto::genres::{genre_tag, GENRES};
use airwave_proto::protocol::{Command, SessionState};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

#[derive(Clone)]
struct HttpState {
    state_rx: watch::Receiver<SessionState>,
    command_tx: mpsc::Sender<Command>,
}

#[derive(Serialize)]
struct GenreInfo {
    label: &'static str,
    tag: String,
}

#[derive(Deserialize)]
struct SearchParams {
    q: String,
}

pub fn start_server(
    bind_address: String,
    port: u16,
    state_rx: watch::Receiver<SessionState>,
    command_tx: mpsc::Sender<Command>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(HttpState {
            state_rx,
            command_tx,
        });

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

fn router(state: HttpState) -> Router {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/genres", get(get_genres))
        .route("/api/play/:idx", post(play_station))
        .route("/api/popular/:idx/play", post(play_popular))
        .route("/api/popular/refresh", post(refresh_popular))
        .route("/api/favorites", post(add_active_favorite))
        .route(
            "/api/favorites/:id",
            post(add_favorite).delete(remove_favorite),
        )
        .route("/api/favorites/:id/play", post(play_favorite))
        .route("/api/toggle", post(toggle))
        .route("/api/next", post(next_station))
        .route("/api/prev", post(prev_station))
        .route("/api/random", post(random_station))
        .route("/api/volume/:value", post(set_volume))
        .route("/api/search", post(search))
        .route("/api/genre/:tag", post(select_genre))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn dispatch(state: &HttpState, cmd: Command) -> StatusCode {
    info!("HTTP API: {:?}", cmd);
    if state.command_tx.send(cmd).await.is_err() {
        error!("HTTP API: command channel closed");
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::ACCEPTED
}

async fn get_state(State(state): State<HttpState>) -> Json<SessionState> {
    Json(state.state_rx.borrow().clone())
}

async fn get_genres() -> Json<Vec<GenreInfo>> {
    Json(
        GENRES
            .iter()
            .map(|&label| GenreInfo {
                label,
                tag: genre_tag(label),
            })
            .collect(),
    )
}

async fn play_station(State(state): State<HttpState>, Path(idx): Path<usize>) -> StatusCode {
    dispatch(&state, Command::PlayStation { idx }).await
}

async fn play_popular(State(state): State<HttpState>, Path(idx): Path<usize>) -> StatusCode {
    dispatch(&state, Command::PlayPopular { idx }).await
}

async fn play_favorite(State(state): State<HttpState>, Path(id): Path<String>) -> StatusCode {
    dispatch(&state, Command::PlayFavorite { id }).await
}

async fn refresh_popular(State(state): State<HttpState>) -> StatusCode {
    dispatch(&state, Command::RefreshPopular).await
}

async fn add_active_favorite(State(state): State<HttpState>) -> StatusCode {
    dispatch(&state, Command::AddFavorite { id: None }).await
}

async fn add_favorite(State(state): State<HttpState>, Path(id): Path<String>) -> StatusCode {
    dispatch(&state, Command::AddFavorite { id: Some(id) }).await
}

async fn remove_favorite(State(state): State<HttpState>, Path(id): Path<String>) -> StatusCode {
    dispatch(&state, Command::RemoveFavorite { id }).await
}

async fn toggle(State(state): State<HttpState>) -> StatusCode {
    dispatch(&state, Command::TogglePlay).await
}

async fn next_station(State(state): State<HttpState>) -> StatusCode {
    dispatch(&state, Command::Next).await
}

async fn prev_station(State(state): State<HttpState>) -> StatusCode {
    dispatch(&state, Command::Prev).await
}

async fn random_station(State(state): State<HttpState>) -> StatusCode {
    dispatch(&state, Command::Random).await
}

/// `value` is 0.0..=1.0; the controller clamps anything else.
async fn set_volume(State(state): State<HttpState>, Path(value): Path<f32>) -> StatusCode {
    dispatch(&state, Command::Volume { value }).await
}

async fn search(
    State(state): State<HttpState>,
    Query(params): Query<SearchParams>,
) -> StatusCode {
    dispatch(&state, Command::Search { text: params.q }).await
}

async fn select_genre(State(state): State<HttpState>, Path(tag): Path<String>) -> StatusCode {
    dispatch(&state, Command::SelectGenre { tag }).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::{Method, StatusCode as Status};

    async fn serve() -> (String, watch::Sender<SessionState>, mpsc::Receiver<Command>) {
        let (state_tx, state_rx) = watch::channel(SessionState::default());
        let (command_tx, command_rx) = mpsc::channel(8);
        (spawn_app(state_rx, command_tx).await, state_tx, command_rx)
    }

    async fn spawn_app(
        state_rx: watch::Receiver<SessionState>,
        command_tx: mpsc::Sender<Command>,
    ) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(HttpState {
            state_rx,
            command_tx,
        });
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_routes_map_to_commands() {
        let (base, _state_tx, mut commands) = serve().await;
        let client = reqwest::Client::new();

        let cases = [
            (Method::POST, "/api/play/2", Command::PlayStation { idx: 2 }),
            (Method::POST, "/api/toggle", Command::TogglePlay),
            (Method::POST, "/api/volume/0.4", Command::Volume { value: 0.4 }),
            (
                Method::POST,
                "/api/search?q=bbc%20radio",
                Command::Search {
                    text: "bbc radio".to_string(),
                },
            ),
            (
                Method::POST,
                "/api/genre/jazz",
                Command::SelectGenre {
                    tag: "jazz".to_string(),
                },
            ),
            (Method::POST, "/api/favorites", Command::AddFavorite { id: None }),
            (
                Method::DELETE,
                "/api/favorites/abc",
                Command::RemoveFavorite {
                    id: "abc".to_string(),
                },
            ),
            (
                Method::POST,
                "/api/favorites/abc/play",
                Command::PlayFavorite {
                    id: "abc".to_string(),
                },
            ),
            (Method::POST, "/api/popular/refresh", Command::RefreshPopular),
        ];

        for (method, path, expected) in cases {
            let response = client
                .request(method.clone(), format!("{base}{path}"))
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), Status::ACCEPTED, "{method} {path}");
            assert_eq!(commands.recv().await, Some(expected));
        }
    }

    #[tokio::test]
    async fn test_closed_controller_is_unavailable() {
        let (_state_tx, state_rx) = watch::channel(SessionState::default());
        let (command_tx, command_rx) = mpsc::channel(8);
        drop(command_rx);
        let base = spawn_app(state_rx, command_tx).await;

        let response = reqwest::Client::new()
            .post(format!("{base}/api/toggle"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), Status::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_state_and_genres() {
        let (base, state_tx, _commands) = serve().await;
        state_tx.send_replace(SessionState {
            rev: 3,
            volume: 0.5,
            ..SessionState::default()
        });

        let response = reqwest::get(format!("{base}/api/state")).await.unwrap();
        assert_eq!(response.status(), Status::OK);
        let state: SessionState = response.json().await.unwrap();
        assert_eq!(state.rev, 3);
        assert_eq!(state.volume, 0.5);

        let genres: serde_json::Value = reqwest::get(format!("{base}/api/genres"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(genres[2]["tag"], "jazz");
        assert_eq!(genres.as_array().unwrap().len(), GENRES.len());
    }
}
