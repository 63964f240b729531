use nav_synapse::core::context::require_context;
use nav_synapse::prelude::*;

struct HelloPlugin {
    ctx: Option<Context>,
}

#[async_trait]
impl Plugin for HelloPlugin {
    fn name(&self) -> &str {
        "hello"
    }

    async fn init(&mut self, ctx: Context) -> Result<()> {
        self.ctx = Some(ctx);
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        let ctx = require_context(&self.ctx, "hello", "start")?;
        ctx.emit("hello:world", json!({ "greeting": "Hello, World!" }));
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    async fn destroy(&mut self) -> Result<()> {
        self.ctx = None;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut core = NavCore::build()
        .add_plugin(HelloPlugin { ctx: None })
        .build()?;

    core.init().await?;
    core.event_bus()?.on("hello:world", |event| {
        println!("{}", event.payload["greeting"].as_str().unwrap_or_default());
        Ok(())
    });
    core.start().await?;
    core.destroy().await?;

    Ok(())
}
