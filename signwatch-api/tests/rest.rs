use std::{
	collections::HashMap,
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc, Mutex,
	},
	time::{SystemTime, UNIX_EPOCH},
};

use axum::{
	extract::State,
	http::{header::AUTHORIZATION, HeaderMap, StatusCode},
	response::{IntoResponse, Response},
	routing::{delete, get, post, put},
	Json, Router,
};
use jsonwebtoken::{EncodingKey, Header};
use serde_json::{json, Value};
use signwatch_api::{query, AuthSession, Client, Error, PasswordChange, ProfileUpdate, Registration, SortKey};
use signwatch_token::{TokenPair, TokenStore};
use url::Url;

fn token(kind: &str, ttl: i64) -> String {
	static NEXT: AtomicU64 = AtomicU64::new(0);

	let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64;
	let claims = json!({
		"token_type": kind,
		"exp": now + ttl,
		"iat": now,
		"jti": NEXT.fetch_add(1, Ordering::SeqCst).to_string(),
		"user_id": 1,
	});

	jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(b"backend")).unwrap()
}

fn fresh() -> TokenPair {
	TokenPair::new(token("access", 300), token("refresh", 86_400))
}

#[derive(Default)]
struct Backend {
	/// The only access token the backend currently accepts.
	access: String,
	refresh_fails: bool,
	always_unauthorized: bool,
	logout_fails: bool,
	bio: String,

	hits: HashMap<&'static str, usize>,
	bearers: Vec<Option<String>>,
	revoked: Vec<String>,
}

type Shared = Arc<Mutex<Backend>>;

impl Backend {
	fn hit(&mut self, route: &'static str) {
		*self.hits.entry(route).or_default() += 1;
	}

	fn hits(&self, route: &str) -> usize {
		self.hits.get(route).copied().unwrap_or_default()
	}

	fn authorized(&self, headers: &HeaderMap) -> bool {
		let expected = format!("Bearer {}", self.access);
		!self.always_unauthorized && headers.get(AUTHORIZATION).is_some_and(|v| *v == *expected)
	}

	fn user(&self) -> Value {
		json!({
			"id": 1,
			"username": "ada",
			"email": "ada@example.com",
			"first_name": "Ada",
			"last_name": "",
			"date_joined": "2024-01-02T03:04:05Z",
			"profile": {
				"bio": self.bio,
				"location": "",
				"preferred_confidence_threshold": 0.25,
				"email_notifications": true
			}
		})
	}

	fn issue(&mut self) -> Value {
		let tokens = fresh();
		self.access = tokens.access.clone();
		json!({ "user": self.user(), "tokens": { "access": tokens.access, "refresh": tokens.refresh } })
	}
}

fn unauthorized() -> Response {
	(
		StatusCode::UNAUTHORIZED,
		Json(json!({ "detail": "Authentication credentials were not provided." })),
	)
		.into_response()
}

async fn login(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
	let mut state = state.lock().unwrap();
	state.hit("login");

	if body["password"] != "correct horse" {
		return (
			StatusCode::BAD_REQUEST,
			Json(json!({ "non_field_errors": ["Invalid credentials"] })),
		)
			.into_response();
	}

	Json(state.issue()).into_response()
}

async fn register(State(state): State<Shared>, Json(_): Json<Value>) -> Response {
	let mut state = state.lock().unwrap();
	state.hit("register");
	(StatusCode::CREATED, Json(state.issue())).into_response()
}

async fn refresh(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
	let mut state = state.lock().unwrap();
	state.hit("refresh");

	if state.refresh_fails || body["refresh"].as_str().is_none() {
		return (
			StatusCode::UNAUTHORIZED,
			Json(json!({ "detail": "Token is invalid or expired" })),
		)
			.into_response();
	}

	state.access = token("access", 300);
	Json(json!({ "access": state.access })).into_response()
}

async fn logout(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
	let mut state = state.lock().unwrap();
	state.hit("logout");

	if let Some(refresh) = body["refresh_token"].as_str() {
		state.revoked.push(refresh.to_string());
	}

	if state.logout_fails {
		return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
	}

	Json(json!({ "message": "Successfully logged out" })).into_response()
}

async fn profile(State(state): State<Shared>, headers: HeaderMap) -> Response {
	let mut state = state.lock().unwrap();
	state.hit("profile");

	if !state.authorized(&headers) {
		return unauthorized();
	}

	Json(state.user()).into_response()
}

async fn update_profile(State(state): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
	let mut state = state.lock().unwrap();
	if !state.authorized(&headers) {
		return unauthorized();
	}

	if let Some(bio) = body["bio"].as_str() {
		state.bio = bio.to_string();
	}

	Json(json!({ "message": "Profile updated successfully", "user": state.user() })).into_response()
}

async fn change_password(State(state): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
	let state = state.lock().unwrap();
	if !state.authorized(&headers) {
		return unauthorized();
	}

	if body["old_password"] != "correct horse" {
		return (
			StatusCode::BAD_REQUEST,
			Json(json!({ "old_password": ["Old password is incorrect."] })),
		)
			.into_response();
	}

	Json(json!({ "message": "Password changed successfully" })).into_response()
}

async fn delete_account(State(state): State<Shared>, headers: HeaderMap) -> Response {
	let state = state.lock().unwrap();
	if !state.authorized(&headers) {
		return unauthorized();
	}

	Json(json!({ "message": "Account deleted successfully" })).into_response()
}

fn record(id: u64, timestamp: &str, count: usize, confidence: f64, time: f64, sign: &str) -> Value {
	json!({
		"id": id,
		"timestamp": timestamp,
		"image": null,
		"detections_count": count,
		"confidence_avg": confidence,
		"processing_time": time,
		"results": [{
			"class_name": sign,
			"confidence": confidence,
			"bbox_x": 0.1, "bbox_y": 0.1, "bbox_width": 0.2, "bbox_height": 0.2
		}]
	})
}

async fn detections(State(state): State<Shared>, headers: HeaderMap) -> Response {
	let state = state.lock().unwrap();
	if !state.authorized(&headers) {
		return unauthorized();
	}

	Json(json!([
		record(1, "2024-05-01T10:00:00Z", 1, 0.92, 0.040, "Stop"),
		record(2, "2024-05-03T10:00:00Z", 2, 0.71, 0.030, "Speed Limit 50"),
		record(3, "2024-05-02T10:00:00.5Z", 1, 0.66, 0.090, "stop"),
	]))
	.into_response()
}

fn stats() -> Value {
	json!({
		"total_detections": 3,
		"avg_processing_time": 0.053,
		"avg_confidence": 0.763,
		"most_detected_signs": [
			{ "class_name": "Stop", "count": 2 },
			{ "class_name": "Speed Limit 50", "count": 1 }
		]
	})
}

async fn global_stats(State(state): State<Shared>, headers: HeaderMap) -> Response {
	let mut state = state.lock().unwrap();
	let bearer = headers
		.get(AUTHORIZATION)
		.and_then(|v| v.to_str().ok())
		.map(str::to_string);
	state.bearers.push(bearer);

	Json(stats()).into_response()
}

async fn user_stats(State(state): State<Shared>, headers: HeaderMap) -> Response {
	let state = state.lock().unwrap();
	if !state.authorized(&headers) {
		return unauthorized();
	}

	Json(json!({
		"total_sessions": 4,
		"total_signs_detected": 9,
		"avg_confidence": 0.812,
		"avg_processing_time": 0.051,
		"member_since": "2024-01-02T03:04:05.678901Z"
	}))
	.into_response()
}

async fn detect(State(state): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
	let mut state = state.lock().unwrap();
	let bearer = headers
		.get(AUTHORIZATION)
		.and_then(|v| v.to_str().ok())
		.map(str::to_string);
	state.bearers.push(bearer);

	if body["image"].as_str().unwrap_or_default().is_empty() {
		return (StatusCode::BAD_REQUEST, Json(json!({ "error": "No image provided" }))).into_response();
	}

	let detection = record(9, "2024-05-04T10:00:00Z", 1, 0.88, 0.045, "Yield");
	Json(json!({
		"detection": detection,
		"detections": detection["results"],
		"processing_time": 0.045
	}))
	.into_response()
}

async fn serve() -> (Client, Shared) {
	let state = Shared::default();

	let app = Router::new()
		.route("/api/auth/login/", post(login))
		.route("/api/auth/register/", post(register))
		.route("/api/auth/token/refresh/", post(refresh))
		.route("/api/auth/logout/", post(logout))
		.route("/api/auth/profile/", get(profile))
		.route("/api/auth/profile/update/", put(update_profile))
		.route("/api/auth/profile/stats/", get(user_stats))
		.route("/api/auth/change-password/", post(change_password))
		.route("/api/auth/delete-account/", delete(delete_account))
		.route("/api/detections/", get(detections))
		.route("/api/global-stats/", get(global_stats))
		.route("/api/detect/", post(detect))
		.with_state(state.clone());

	let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

	let client = Client::new(Url::parse(&format!("http://{addr}/api")).unwrap());
	(client, state)
}

fn stored(dir: &tempfile::TempDir, tokens: Option<TokenPair>) -> (TokenStore, AuthSession) {
	let store = TokenStore::new(dir.path().join("tokens.json"));
	if let Some(tokens) = tokens {
		store.save(&tokens).unwrap();
	}

	let auth = AuthSession::restore(store.clone()).unwrap();
	(store, auth)
}

#[tokio::test]
async fn login_persists_tokens() {
	let (client, state) = serve().await;
	let dir = tempfile::tempdir().unwrap();
	let (store, mut auth) = stored(&dir, None);

	let user = client.login(&mut auth, "ada", "correct horse").await.unwrap();
	assert_eq!(user.username, "ada");
	assert_eq!(auth.user().unwrap().first_name, "Ada");
	assert_eq!(store.load().unwrap().as_ref(), auth.tokens());

	// The next run starts logged in.
	let (_, mut restored) = stored(&dir, None);
	let profile = client.profile(&mut restored).await.unwrap();
	assert_eq!(profile.email, "ada@example.com");
	assert_eq!(state.lock().unwrap().hits("refresh"), 0);
}

#[tokio::test]
async fn login_rejected() {
	let (client, _state) = serve().await;
	let mut auth = AuthSession::anonymous();

	let err = client.login(&mut auth, "ada", "wrong").await.unwrap_err();
	let fields = match err {
		Error::Rejected(fields) => fields,
		err => panic!("unexpected error: {err}"),
	};
	assert_eq!(fields.get("non_field_errors"), Some("Invalid credentials"));
	assert!(!auth.is_authenticated());
}

#[tokio::test]
async fn proactive_refresh() {
	let (client, state) = serve().await;
	let dir = tempfile::tempdir().unwrap();
	let expired = TokenPair::new(token("access", -60), token("refresh", 86_400));
	let (store, mut auth) = stored(&dir, Some(expired.clone()));

	client.profile(&mut auth).await.unwrap();

	let state = state.lock().unwrap();
	assert_eq!(state.hits("refresh"), 1);
	// Refreshed before the request, so the backend never had to say 401.
	assert_eq!(state.hits("profile"), 1);

	let saved = store.load().unwrap().unwrap();
	assert_eq!(saved.access, state.access);
	assert_eq!(saved.refresh, expired.refresh);
}

#[tokio::test]
async fn retries_once_after_401() {
	let (client, state) = serve().await;
	let dir = tempfile::tempdir().unwrap();

	// Not expired, but the backend no longer accepts it.
	let (_store, mut auth) = stored(&dir, Some(fresh()));

	client.profile(&mut auth).await.unwrap();

	let state = state.lock().unwrap();
	assert_eq!(state.hits("refresh"), 1);
	assert_eq!(state.hits("profile"), 2);
}

#[tokio::test]
async fn gives_up_after_one_retry() {
	let (client, state) = serve().await;
	state.lock().unwrap().always_unauthorized = true;

	let dir = tempfile::tempdir().unwrap();
	let (_store, mut auth) = stored(&dir, Some(fresh()));

	let err = client.profile(&mut auth).await.unwrap_err();
	assert!(err.is_unauthorized(), "{err}");

	let state = state.lock().unwrap();
	assert_eq!(state.hits("refresh"), 1);
	assert_eq!(state.hits("profile"), 2);
}

#[tokio::test]
async fn failed_refresh_logs_out() {
	let (client, state) = serve().await;
	state.lock().unwrap().refresh_fails = true;

	let dir = tempfile::tempdir().unwrap();
	let expired = TokenPair::new(token("access", -60), token("refresh", 86_400));
	let (store, mut auth) = stored(&dir, Some(expired));

	let err = client.profile(&mut auth).await.unwrap_err();
	assert!(matches!(err, Error::SessionExpired), "{err}");
	assert!(!auth.is_authenticated());
	assert!(store.load().unwrap().is_none());
	assert_eq!(state.lock().unwrap().hits("profile"), 0);
}

#[tokio::test]
async fn expired_refresh_token_never_sent() {
	let (client, state) = serve().await;
	let dir = tempfile::tempdir().unwrap();
	let expired = TokenPair::new(token("access", -60), token("refresh", -60));
	let (store, mut auth) = stored(&dir, Some(expired));

	let err = client.detections(&mut auth).await.unwrap_err();
	assert!(matches!(err, Error::SessionExpired), "{err}");
	assert!(store.load().unwrap().is_none());
	assert_eq!(state.lock().unwrap().hits("refresh"), 0);
}

#[tokio::test]
async fn requires_login() {
	let (client, _state) = serve().await;
	let mut auth = AuthSession::anonymous();

	assert!(matches!(client.profile(&mut auth).await, Err(Error::LoggedOut)));
	assert!(matches!(client.detections(&mut auth).await, Err(Error::LoggedOut)));
}

#[tokio::test]
async fn logout_clears_even_on_failure() {
	let (client, state) = serve().await;
	state.lock().unwrap().logout_fails = true;

	let dir = tempfile::tempdir().unwrap();
	let (store, mut auth) = stored(&dir, None);
	client.login(&mut auth, "ada", "correct horse").await.unwrap();
	let refresh = auth.tokens().unwrap().refresh.clone();

	client.logout(&mut auth).await;
	assert!(!auth.is_authenticated());
	assert!(auth.user().is_none());
	assert!(store.load().unwrap().is_none());
	assert_eq!(state.lock().unwrap().revoked, [refresh]);
}

#[tokio::test]
async fn register_validates_before_sending() {
	let (client, state) = serve().await;
	let mut auth = AuthSession::anonymous();

	let form = Registration {
		username: "ad".to_string(),
		email: "ada@example".to_string(),
		password: "correct horse".to_string(),
		password_confirm: "correct horse".to_string(),
		..Default::default()
	};

	let Err(Error::Invalid(fields)) = client.register(&mut auth, &form).await else {
		panic!("expected a validation error");
	};
	assert_eq!(fields.len(), 2);
	assert_eq!(state.lock().unwrap().hits("register"), 0);

	let form = Registration {
		username: "ada".to_string(),
		email: "ada@example.com".to_string(),
		..form
	};
	client.register(&mut auth, &form).await.unwrap();
	assert!(auth.is_authenticated());
}

#[tokio::test]
async fn optional_auth() {
	let (client, state) = serve().await;
	let mut auth = AuthSession::anonymous();

	let stats = client.global_stats(&mut auth).await.unwrap();
	assert_eq!(stats.most_detected_signs[0].class_name, "Stop");

	let res = client.detect(&mut auth, "data:image/jpeg;base64,/9j/").await.unwrap();
	assert_eq!(res.detections[0].label, "Yield");

	client.login(&mut auth, "ada", "correct horse").await.unwrap();
	client.global_stats(&mut auth).await.unwrap();

	let state = state.lock().unwrap();
	assert_eq!(state.bearers[0], None);
	assert_eq!(state.bearers[1], None);
	assert_eq!(state.bearers[2], Some(format!("Bearer {}", state.access)));
}

#[tokio::test]
async fn detect_rejects_empty_image() {
	let (client, _state) = serve().await;
	let mut auth = AuthSession::anonymous();

	let err = client.detect(&mut auth, "").await.unwrap_err();
	assert!(matches!(err, Error::Status { message, .. } if message == "No image provided"));
}

#[tokio::test]
async fn history() {
	let (client, _state) = serve().await;
	let mut auth = AuthSession::anonymous();
	client.login(&mut auth, "ada", "correct horse").await.unwrap();

	let records = client.detections(&mut auth).await.unwrap();
	assert_eq!(records.len(), 3);

	let ids: Vec<_> = query(&records, "stop", SortKey::Timestamp).iter().map(|r| r.id).collect();
	assert_eq!(ids, [3, 1]);

	let ids: Vec<_> = query(&records, "", SortKey::ProcessingTime).iter().map(|r| r.id).collect();
	assert_eq!(ids, [2, 1, 3]);
}

#[tokio::test]
async fn account() {
	let (client, _state) = serve().await;
	let dir = tempfile::tempdir().unwrap();
	let (store, mut auth) = stored(&dir, None);
	client.login(&mut auth, "ada", "correct horse").await.unwrap();

	let update = ProfileUpdate {
		bio: Some("Cyclist".to_string()),
		..Default::default()
	};
	let user = client.update_profile(&mut auth, &update).await.unwrap();
	assert_eq!(user.profile.unwrap().bio, "Cyclist");
	assert_eq!(auth.user().unwrap().profile.as_ref().unwrap().bio, "Cyclist");

	let stats = client.user_stats(&mut auth).await.unwrap();
	assert_eq!(stats.total_signs_detected, 9);

	let change = PasswordChange {
		old_password: "wrong".to_string(),
		new_password: "battery staple".to_string(),
		new_password_confirm: "battery staple".to_string(),
	};
	let Err(Error::Rejected(fields)) = client.change_password(&mut auth, &change).await else {
		panic!("expected the backend to reject the old password");
	};
	assert_eq!(fields.get("old_password"), Some("Old password is incorrect."));

	let change = PasswordChange {
		old_password: "correct horse".to_string(),
		..change
	};
	client.change_password(&mut auth, &change).await.unwrap();

	client.delete_account(&mut auth).await.unwrap();
	assert!(!auth.is_authenticated());
	assert!(store.load().unwrap().is_none());
}
