//! 编排循环集成测试：脚本化网关 + 计数工具

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::{json, Map, Value};

    use deskpilot::agent::{AgentComponents, CLEARED_MESSAGE};
    use deskpilot::config::AppConfig;
    use deskpilot::core::spawn_session;
    use deskpilot::llm::{GatewayReply, ScriptedGateway};
    use deskpilot::memory::{ConversationHistory, Message, Role, ToolCall};
    use deskpilot::react::{Orchestrator, PromptBuilder, CANONICAL_SUCCESS};
    use deskpilot::tools::{Tool, ToolExecutor, ToolOutcome, ToolRegistry};

    /// 记录每次调用参数的工具
    struct Recorder {
        name: &'static str,
        text_entry: bool,
        calls: Arc<Mutex<Vec<Map<String, Value>>>>,
        log: Option<Arc<Mutex<Vec<String>>>>,
    }

    impl Recorder {
        fn new(name: &'static str) -> (Self, Arc<Mutex<Vec<Map<String, Value>>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    name,
                    text_entry: false,
                    calls: calls.clone(),
                    log: None,
                },
                calls,
            )
        }

        fn text_entry(mut self) -> Self {
            self.text_entry = true;
            self
        }

        fn with_log(mut self, log: Arc<Mutex<Vec<String>>>) -> Self {
            self.log = Some(log);
            self
        }
    }

    #[async_trait]
    impl Tool for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "records calls"
        }

        fn is_text_entry(&self) -> bool {
            self.text_entry
        }

        async fn execute(&self, args: Map<String, Value>) -> ToolOutcome {
            self.calls.lock().unwrap().push(args);
            if let Some(log) = &self.log {
                log.lock().unwrap().push(self.name.to_string());
            }
            ToolOutcome::ok(json!({ "tool": self.name }))
        }
    }

    struct Panicky;

    #[async_trait]
    impl Tool for Panicky {
        fn name(&self) -> &str {
            "explode"
        }

        fn description(&self) -> &str {
            "always panics"
        }

        async fn execute(&self, _args: Map<String, Value>) -> ToolOutcome {
            panic!("boom")
        }
    }

    fn orchestrator(gateway: Arc<ScriptedGateway>, registry: ToolRegistry) -> Orchestrator {
        let executor = ToolExecutor::new(Arc::new(registry), 5);
        Orchestrator::new(gateway, executor)
            .with_prompt(PromptBuilder::new("JARVIS", "pt-BR").without_dynamic_context())
    }

    fn tool_result(msg: &Message) -> Value {
        assert_eq!(msg.role, Role::Tool);
        serde_json::from_str(&msg.content).unwrap()
    }

    fn padded(text: &str) -> String {
        format!("{text} Escrevi o resumo completo da reunião com todos os pontos discutidos hoje.")
    }

    #[tokio::test]
    async fn test_loop_stops_at_iteration_ceiling() {
        let (recorder, calls) = Recorder::new("echo");
        let mut registry = ToolRegistry::new();
        registry.register(recorder);
        let gateway = Arc::new(ScriptedGateway::new([GatewayReply::with_tool_calls(
            "Ainda trabalhando...",
            vec![ToolCall::new("echo", json!({"text": "x"}))],
        )]));
        let orch = orchestrator(gateway.clone(), registry);
        let mut history = ConversationHistory::new();

        let answer = orch.process_message(&mut history, "faça algo").await;
        assert_eq!(gateway.call_count(), 15);
        assert_eq!(calls.lock().unwrap().len(), 15);
        assert_eq!(answer, "Ainda trabalhando...");
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn test_configured_ceiling_is_respected_per_message() {
        let (recorder, _calls) = Recorder::new("echo");
        let mut registry = ToolRegistry::new();
        registry.register(recorder);
        let gateway = Arc::new(ScriptedGateway::new([GatewayReply::with_tool_calls(
            "",
            vec![ToolCall::new("echo", json!({}))],
        )]));
        let orch = orchestrator(gateway.clone(), registry).with_max_iterations(3);
        let mut history = ConversationHistory::new();

        assert_eq!(orch.process_message(&mut history, "a").await, "");
        assert_eq!(gateway.call_count(), 3);
        orch.process_message(&mut history, "b").await;
        assert_eq!(gateway.call_count(), 6);
    }

    #[tokio::test]
    async fn test_gateway_error_is_final_answer_without_tools() {
        let (recorder, calls) = Recorder::new("echo");
        let mut registry = ToolRegistry::new();
        registry.register(recorder);
        let gateway = Arc::new(ScriptedGateway::new([GatewayReply {
            content: "Erro ao conectar com o modelo: connection refused".into(),
            tool_calls: vec![ToolCall::new("echo", json!({"text": "x"}))],
            error: Some("connection refused".into()),
        }]));
        let orch = orchestrator(gateway.clone(), registry);
        let mut history = ConversationHistory::new();

        let answer = orch.process_message(&mut history, "oi").await;
        assert_eq!(answer, "Erro ao conectar com o modelo: connection refused");
        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(gateway.call_count(), 1);
        assert_eq!(history.messages()[1].content, answer);
    }

    #[tokio::test]
    async fn test_guard_blocks_typing_the_spoken_reply() {
        let (typer, calls) = Recorder::new("type_into_application");
        let mut registry = ToolRegistry::new();
        registry.register(typer.text_entry());
        let spoken = padded("Feito!");
        assert!(spoken.chars().count() > 60);
        let gateway = Arc::new(ScriptedGateway::new([
            GatewayReply::with_tool_calls(
                spoken.clone(),
                vec![ToolCall::new(
                    "type_into_application",
                    json!({ "text": spoken.clone() }),
                )],
            ),
            GatewayReply::text("Ok, não vou digitar."),
        ]));
        let orch = orchestrator(gateway.clone(), registry);
        let mut history = ConversationHistory::new();

        let answer = orch.process_message(&mut history, "resuma a reunião").await;
        assert_eq!(answer, "Ok, não vou digitar.");
        assert!(calls.lock().unwrap().is_empty());

        let second = &gateway.requests()[1].messages;
        let result = tool_result(second.last().unwrap());
        assert_eq!(result["success"], json!(false));
        assert_eq!(result["blocked"], json!(true));
        assert_eq!(result["error_kind"], json!("blocked"));
    }

    #[tokio::test]
    async fn test_guard_ignores_non_text_entry_tools() {
        let (recorder, calls) = Recorder::new("echo");
        let mut registry = ToolRegistry::new();
        registry.register(recorder);
        let spoken = padded("Feito!");
        let gateway = Arc::new(ScriptedGateway::new([
            GatewayReply::with_tool_calls(
                spoken.clone(),
                vec![ToolCall::new("echo", json!({ "text": spoken.clone() }))],
            ),
            GatewayReply::text("fim"),
        ]));
        let orch = orchestrator(gateway, registry);
        orch.process_message(&mut ConversationHistory::new(), "x").await;
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_self_heal_dispatches_embedded_call() {
        let (calc, calls) = Recorder::new("calculate");
        let mut registry = ToolRegistry::new();
        registry.register(calc);
        let gateway = Arc::new(ScriptedGateway::new([
            GatewayReply::text(
                r#"Vou fazer isso. {"name": "calculate", "parameters": {"expression": "2+2"}}"#,
            ),
            GatewayReply::text("O resultado é 4."),
        ]));
        let orch = orchestrator(gateway.clone(), registry);
        let mut history = ConversationHistory::new();

        let answer = orch.process_message(&mut history, "quanto é 2+2?").await;
        assert_eq!(answer, "O resultado é 4.");
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0]["expression"], json!("2+2"));

        let second = &gateway.requests()[1].messages;
        let assistant_turn = &second[second.len() - 2];
        assert_eq!(assistant_turn.tool_calls[0].name, "calculate");
        // 可见文本只比 JSON 多出十几个字符，视为纯泄漏
        assert_eq!(assistant_turn.content, "");
    }

    #[tokio::test]
    async fn test_sanitizer_replaces_leaked_result() {
        let gateway = Arc::new(ScriptedGateway::new([GatewayReply::text(
            r#"{"success": true, "action": "install"}"#,
        )]));
        let orch = orchestrator(gateway, ToolRegistry::new());
        let mut history = ConversationHistory::new();

        let answer = orch.process_message(&mut history, "instale o 7zip").await;
        assert_eq!(answer, CANONICAL_SUCCESS);
        assert_eq!(history.messages()[1].content, CANONICAL_SUCCESS);
    }

    #[tokio::test]
    async fn test_unknown_tool_continues_loop() {
        let gateway = Arc::new(ScriptedGateway::new([
            GatewayReply::with_tool_calls("", vec![ToolCall::new("does_not_exist", json!({}))]),
            GatewayReply::text("Desculpe, não tenho essa ferramenta."),
        ]));
        let orch = orchestrator(gateway.clone(), ToolRegistry::new());

        let answer = orch
            .process_message(&mut ConversationHistory::new(), "x")
            .await;
        assert_eq!(answer, "Desculpe, não tenho essa ferramenta.");
        assert_eq!(gateway.call_count(), 2);

        let second = &gateway.requests()[1].messages;
        let result = tool_result(second.last().unwrap());
        assert_eq!(result["success"], json!(false));
        assert!(result["error"].as_str().unwrap().ends_with("not found"));
    }

    #[tokio::test]
    async fn test_panicking_tool_becomes_error_result() {
        let mut registry = ToolRegistry::new();
        registry.register(Panicky);
        let gateway = Arc::new(ScriptedGateway::new([
            GatewayReply::with_tool_calls("", vec![ToolCall::new("explode", json!({}))]),
            GatewayReply::text("A ferramenta falhou."),
        ]));
        let orch = orchestrator(gateway.clone(), registry);

        let answer = orch
            .process_message(&mut ConversationHistory::new(), "x")
            .await;
        assert_eq!(answer, "A ferramenta falhou.");
        let result = tool_result(gateway.requests()[1].messages.last().unwrap());
        assert_eq!(result["error_kind"], json!("panicked"));
        assert!(result["error"].as_str().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_malformed_string_arguments_default_to_empty() {
        let (recorder, calls) = Recorder::new("echo");
        let mut registry = ToolRegistry::new();
        registry.register(recorder);
        let gateway = Arc::new(ScriptedGateway::new([
            GatewayReply::with_tool_calls("", vec![ToolCall::new("echo", json!("{broken"))]),
            GatewayReply::text("ok"),
        ]));
        let orch = orchestrator(gateway, registry);

        orch.process_message(&mut ConversationHistory::new(), "x").await;
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].is_empty());
    }

    #[tokio::test]
    async fn test_calls_in_one_round_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (first, _) = Recorder::new("first");
        let (second, _) = Recorder::new("second");
        let mut registry = ToolRegistry::new();
        registry.register(first.with_log(log.clone()));
        registry.register(second.with_log(log.clone()));
        let gateway = Arc::new(ScriptedGateway::new([
            GatewayReply::with_tool_calls(
                "",
                vec![
                    ToolCall::new("second", json!({})),
                    ToolCall::new("first", json!({})),
                    ToolCall::new("second", json!({})),
                ],
            ),
            GatewayReply::text("ok"),
        ]));
        let orch = orchestrator(gateway.clone(), registry);

        orch.process_message(&mut ConversationHistory::new(), "x").await;
        assert_eq!(*log.lock().unwrap(), vec!["second", "first", "second"]);

        let second_request = &gateway.requests()[1].messages;
        let tool_turns: Vec<_> = second_request
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| m.name.clone().unwrap_or_default())
            .collect();
        assert_eq!(tool_turns, vec!["second", "first", "second"]);
    }

    #[tokio::test]
    async fn test_clear_resets_history_but_keeps_collaborators() {
        let gateway = Arc::new(ScriptedGateway::new([GatewayReply::text("Olá!")]));
        let (recorder, _) = Recorder::new("echo");
        let mut registry = ToolRegistry::new();
        registry.register(recorder);
        let components = AgentComponents::new(AppConfig::default(), Arc::new(registry), gateway.clone());
        let handle = spawn_session(components.session());

        assert_eq!(handle.submit("oi").await.unwrap(), "Olá!");
        let before = handle.status().await.unwrap();
        assert_eq!(handle.clear().await.unwrap(), CLEARED_MESSAGE);
        let after = handle.status().await.unwrap();
        assert_eq!(before.tools_count, 1);
        assert_eq!(before, after);

        handle.submit("de novo").await.unwrap();
        let last = gateway.requests().pop().unwrap();
        // system + 新的用户消息，之前的对话已清空
        assert_eq!(last.messages.len(), 2);
        assert_eq!(last.messages[1].content, "de novo");

        handle.quit();
    }

    #[tokio::test]
    async fn test_images_go_with_the_first_model_call_only() {
        let (recorder, _) = Recorder::new("echo");
        let mut registry = ToolRegistry::new();
        registry.register(recorder);
        let gateway = Arc::new(ScriptedGateway::new([
            GatewayReply::with_tool_calls("", vec![ToolCall::new("echo", json!({}))]),
            GatewayReply::text("Uma captura de tela."),
        ]));
        let orch = orchestrator(gateway.clone(), registry);

        let images = vec!["iVBORw0KGgo=".to_string()];
        let answer = orch
            .process_message_with_images(&mut ConversationHistory::new(), "descreva", &images)
            .await;
        assert_eq!(answer, "Uma captura de tela.");

        let requests = gateway.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].images, images);
        assert!(requests[1].images.is_empty());
    }

    #[tokio::test]
    async fn test_handle_submits_images() {
        let gateway = Arc::new(ScriptedGateway::new([GatewayReply::text("Vejo um gráfico.")]));
        let components =
            AgentComponents::new(AppConfig::default(), Arc::new(ToolRegistry::new()), gateway.clone());
        let handle = spawn_session(components.session());

        let images = vec!["aW1n".to_string()];
        let answer = handle.submit_with_images("o que é isso?", images.clone()).await.unwrap();
        assert_eq!(answer, "Vejo um gráfico.");
        handle.submit("e agora?").await.unwrap();

        let requests = gateway.requests();
        assert_eq!(requests[0].images, images);
        assert!(requests[1].images.is_empty());
        handle.quit();
    }
}
