use override_harness::config::Config;
use override_harness::session::Session;
use override_harness::test_utils::StubAgent;

/// A private agent plus the two sessions every override test needs.
pub struct TestAgent {
    pub agent: StubAgent,
    pub config: Config,
    pub session: Session,
    pub invalid_session: Session,
}

impl TestAgent {
    pub async fn start() -> TestAgent {
        let agent = StubAgent::start().await;
        let config = agent.config();
        let session = Session::valid(&config).expect("failed to build session");
        let invalid_session =
            Session::invalid_sdk_key(&config).expect("failed to build invalid session");

        TestAgent {
            agent,
            config,
            session,
            invalid_session,
        }
    }
}
