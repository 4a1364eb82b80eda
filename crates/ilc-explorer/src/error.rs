use ilc_store::FilterError;
use serde_json::json;
use warp::http::StatusCode;
use warp::{reject::Reject, Rejection, Reply};

#[derive(Debug)]
pub struct BadQuery(pub FilterError);

impl Reject for BadQuery {}

pub async fn recover(err: Rejection) -> Result<impl Reply, std::convert::Infallible> {
    let (status, message) = if let Some(BadQuery(filter_err)) = err.find() {
        (StatusCode::BAD_REQUEST, filter_err.to_string())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "not found".to_string())
    } else {
        (StatusCode::BAD_REQUEST, "bad request".to_string())
    };
    Ok(warp::reply::with_status(warp::reply::json(&json!({ "error": message })), status))
}
