/// Card endpoints
use crate::{
    api::middleware::Caller,
    cards::{Card, CardInput, CardPage, PageOptions},
    context::AppContext,
    error::{CardError, CardResult},
    metrics::OperationTimer,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

/// Response of fetchUser
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub sub: String,
}

/// Response of deleteCard
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteCardResponse {
    pub user_id: String,
    pub id: String,
}

/// Response of the bulk label removals
#[derive(Debug, Serialize)]
pub struct LabelsRemovedResponse {
    pub removed: usize,
}

/// Request body of newPracticeDeck
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPracticeDeckRequest {
    pub user_id: String,
    pub page_size: Option<usize>,
}

/// Query parameters of fetchCards
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchCardsParams {
    pub page_size: Option<usize>,
    pub cursor: Option<String>,
    pub label: Option<String>,
    /// "lastTestTime" or "creationTime"
    pub order_by: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OrderBy {
    CreationTime,
    LastTestTime,
}

impl OrderBy {
    fn parse(value: Option<&str>) -> CardResult<Self> {
        match value {
            None | Some("") | Some("creationTime") => Ok(OrderBy::CreationTime),
            Some("lastTestTime") => Ok(OrderBy::LastTestTime),
            Some(other) => Err(CardError::Validation(format!(
                "orderBy must be 'lastTestTime' or 'creationTime', got '{}'",
                other
            ))),
        }
    }
}

/// Build card routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/me", get(fetch_user))
        .route("/api/cards", post(upsert_card))
        .route("/api/practice-decks", post(new_practice_deck))
        .route("/api/users/:user_id/cards", get(fetch_cards))
        .route(
            "/api/users/:user_id/cards/:id",
            get(fetch_card).delete(delete_card),
        )
        .route(
            "/api/users/:user_id/cards/:id/labels",
            delete(delete_labels_on_card),
        )
        .route(
            "/api/users/:user_id/cards/:id/labels/:label",
            put(attach_label).delete(detach_label),
        )
        .route("/api/users/:user_id/labels/:label", delete(delete_label))
}

/// The authenticated caller
async fn fetch_user(caller: Caller) -> CardResult<Json<UserResponse>> {
    let timer = OperationTimer::start("fetchUser");
    timer.finish(Ok(Json(UserResponse { sub: caller.sub })))
}

/// Create (no id) or update a card
async fn upsert_card(
    State(ctx): State<AppContext>,
    Json(input): Json<CardInput>,
) -> CardResult<Json<Card>> {
    let timer = OperationTimer::start("upsertCard");
    timer.finish(ctx.cards.save(input).await.map(Json))
}

async fn delete_card(
    State(ctx): State<AppContext>,
    Path((user_id, id)): Path<(String, String)>,
) -> CardResult<Json<DeleteCardResponse>> {
    let timer = OperationTimer::start("deleteCard");
    let result = ctx.cards.delete(&user_id, &id).await;
    timer.finish(result.map(|_| Json(DeleteCardResponse { user_id, id })))
}

/// Recompute the practice deck and return its cards
async fn new_practice_deck(
    State(ctx): State<AppContext>,
    Json(request): Json<NewPracticeDeckRequest>,
) -> CardResult<Json<Vec<Card>>> {
    let timer = OperationTimer::start("newPracticeDeck");
    let result = ctx
        .cards
        .new_practice_session(&request.user_id, request.page_size)
        .await;
    timer.finish(result.map(|page| Json(page.items)))
}

async fn fetch_card(
    State(ctx): State<AppContext>,
    Path((user_id, id)): Path<(String, String)>,
) -> CardResult<Json<Card>> {
    let timer = OperationTimer::start("fetchCard");
    let result = ctx.cards.find_one(&user_id, &id).await.and_then(|card| {
        card.map(Json)
            .ok_or_else(|| CardError::NotFound(format!("card {} of user {}", id, user_id)))
    });
    timer.finish(result)
}

async fn fetch_cards(
    State(ctx): State<AppContext>,
    Path(user_id): Path<String>,
    Query(params): Query<FetchCardsParams>,
) -> CardResult<Json<CardPage>> {
    let timer = OperationTimer::start("fetchCards");
    timer.finish(find_cards(&ctx, &user_id, params).await.map(Json))
}

async fn find_cards(ctx: &AppContext, user_id: &str, params: FetchCardsParams) -> CardResult<CardPage> {
    let order_by = OrderBy::parse(params.order_by.as_deref())?;
    let options = PageOptions {
        page_size: params.page_size,
        cursor: params.cursor,
    };

    match (params.label.as_deref().filter(|l| !l.is_empty()), order_by) {
        (None, OrderBy::CreationTime) => ctx.cards.find_by_user_id(user_id, options).await,
        (None, OrderBy::LastTestTime) => Err(CardError::Validation(
            "orderBy=lastTestTime requires a label".to_string(),
        )),
        (Some(label), OrderBy::CreationTime) => {
            ctx.cards.find_by_label(user_id, label, options).await
        }
        (Some(label), OrderBy::LastTestTime) => {
            ctx.cards
                .find_by_label_order_by_last_test_time(user_id, label, options)
                .await
        }
    }
}

async fn attach_label(
    State(ctx): State<AppContext>,
    Path((user_id, id, label)): Path<(String, String, String)>,
) -> CardResult<Json<Card>> {
    let timer = OperationTimer::start("attachLabel");
    timer.finish(ctx.cards.attach_label(&user_id, &id, &label).await.map(Json))
}

async fn detach_label(
    State(ctx): State<AppContext>,
    Path((user_id, id, label)): Path<(String, String, String)>,
) -> CardResult<StatusCode> {
    let timer = OperationTimer::start("detachLabel");
    let result = ctx.cards.detach_label(&user_id, &id, &label).await;
    timer.finish(result.map(|_| StatusCode::NO_CONTENT))
}

async fn delete_labels_on_card(
    State(ctx): State<AppContext>,
    Path((user_id, id)): Path<(String, String)>,
) -> CardResult<Json<LabelsRemovedResponse>> {
    let timer = OperationTimer::start("deleteLabelsOnCard");
    let result = ctx.cards.delete_labels_on_card(&user_id, &id).await;
    timer.finish(result.map(|removed| Json(LabelsRemovedResponse { removed })))
}

async fn delete_label(
    State(ctx): State<AppContext>,
    Path((user_id, label)): Path<(String, String)>,
) -> CardResult<Json<LabelsRemovedResponse>> {
    let timer = OperationTimer::start("deleteLabel");
    let result = ctx.cards.delete_label(&user_id, &label).await;
    timer.finish(result.map(|removed| Json(LabelsRemovedResponse { removed })))
}
