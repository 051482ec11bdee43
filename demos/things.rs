//! A small "things" API: a typed list endpoint, a global auth hook, a
//! legacy sink and a custom error handler.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example things
//!   ROOST_CONFIG=roost.toml cargo run --example things
//!
//! Try:
//!   curl -H 'authorization: Bearer demo' 'http://localhost:3000/42/things?limit=2'
//!   curl -H 'authorization: Bearer demo' http://localhost:3000/42/things/7
//!   curl -i http://localhost:3000/42/things
//!   curl -i -X DELETE -H 'authorization: Bearer demo' http://localhost:3000/42/things
//!   curl -i http://localhost:3000/v1/charts/weekly

use roost::{
    App, Config, Error, Flow, HttpError, PathParams, Request, Resource, Response, Server, Status,
};
use serde::Serialize;

#[derive(Serialize)]
struct Thing {
    id: i64,
    owner: String,
    color: &'static str,
}

#[derive(Debug, thiserror::Error)]
#[error("thing {0} does not exist")]
struct NoSuchThing(i64);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = match std::env::var("ROOST_CONFIG") {
        Ok(path) => Config::load(path)?,
        Err(_) => Config::default(),
    };

    let app = App::with_config(config)
        .before(authorize)
        .route("/{user_id}/things", Resource::new().get(list_things))?
        .route("/{user_id}/things/{id}", Resource::new().get(get_thing))?
        .sink(r"/v1/(?P<rest>.*)", gone)?
        .error_handler(|err: NoSuchThing, _: &Request, resp: &mut Response, _: &PathParams| {
            HttpError::not_found()
                .with_description(err.to_string())
                .apply(resp);
            Ok(())
        });

    Server::bind("0.0.0.0:3000")?.serve(app).await?;
    Ok(())
}

// Runs before every routed responder, never before the sink.
fn authorize(req: &mut Request, _: &mut Response, _: &PathParams) -> Result<Flow, Error> {
    match req.header("authorization") {
        Some(token) if token.starts_with("Bearer ") => Ok(Flow::Continue),
        _ => Err(HttpError::unauthorized()
            .with_description("Please provide a bearer token.")
            .into()),
    }
}

// GET /{user_id}/things?limit=N
fn list_things(req: &mut Request, resp: &mut Response, params: &PathParams) -> Result<(), Error> {
    let owner = params.get("user_id").unwrap_or_default();
    let limit = req.query_int_in("limit", 1, 50)?.unwrap_or(10);

    let things: Vec<_> = (1..=limit)
        .map(|id| Thing { id, owner: owner.to_owned(), color: color(id) })
        .collect();
    resp.set_json(serde_json::to_vec(&things)?);
    Ok(())
}

// GET /{user_id}/things/{id}
fn get_thing(_: &mut Request, resp: &mut Response, params: &PathParams) -> Result<(), Error> {
    let id: i64 = params.parse("id")?;
    if !(1..=50).contains(&id) {
        return Err(NoSuchThing(id).into());
    }
    let thing = Thing {
        id,
        owner: params.get("user_id").unwrap_or_default().to_owned(),
        color: color(id),
    };
    resp.set_json(serde_json::to_vec(&thing)?);
    Ok(())
}

// Everything under the retired /v1 API.
fn gone(_: &mut Request, resp: &mut Response, params: &PathParams) -> Result<(), Error> {
    resp.set_status(Status::Gone);
    resp.set_header("link", "</api/v2>; rel=\"successor-version\"")?;
    resp.set_text(format!(
        "/v1/{} has moved to /api/v2",
        params.get("rest").unwrap_or_default()
    ));
    Ok(())
}

fn color(id: i64) -> &'static str {
    ["red", "green", "blue"][(id % 3) as usize]
}
