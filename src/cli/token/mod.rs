//! Issue-token command - signs a bearer token for local testing

use clap::Args;

#[derive(Args, Debug)]
pub struct IssueTokenArgs {
    /// Subject (principal id)
    #[arg(long)]
    pub sub: String,

    #[arg(long)]
    pub email: Option<String>,

    /// Lifetime in hours
    #[arg(long, default_value_t = 24)]
    pub hours: u64,
}

pub async fn run(args: IssueTokenArgs) -> anyhow::Result<()> {
    let config = super::load_config()?;

    if config.auth.jwt_secret.as_deref().unwrap_or_default().is_empty() {
        anyhow::bail!("auth.jwt_secret must be set to issue tokens the gateway will accept");
    }

    let jwt = crate::create_jwt_service(&config);
    let token = jwt.issue_for(&args.sub, args.email, args.hours)?;

    println!("{}", token);
    Ok(())
}
