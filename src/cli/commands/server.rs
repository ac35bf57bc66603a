use crate::cli::AppContext;
use crate::http::{self, AppState};

pub async fn handle(ctx: AppContext) -> anyhow::Result<()> {
    let state = AppState {
        config: ctx.config,
        registry: ctx.registry,
        router: ctx.router,
        resolver: ctx.resolver,
    };
    http::serve(state).await
}
