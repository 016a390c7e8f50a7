use std::sync::Mutex;

use llm::{
    chat::{ChatMessage, ChatProvider, ChatResponse, Tool},
    error::LLMError,
};

#[macro_export]
macro_rules! assert_proposals {
    (
        $(
            $test_name:ident : response => $response:expr, selectors => $selectors:expr
        ),+ $(,)?
    ) => {
        $(
            #[tokio::test]
            async fn $test_name() {
                let context = htmlsift::assist::AssistContext {
                    model: &StubLlmProvider::new($response),
                    rate_limiter: None,
                };
                let proposal = htmlsift::assist::propose_selectors("<h1>Page</h1>", "title", &context)
                    .await
                    .expect("Expected successful proposal.");
                let selectors: Vec<(String, String)> = proposal
                    .fields
                    .into_iter()
                    .map(|field| (field.label, field.selector))
                    .collect();
                let expected: Vec<(String, String)> = $selectors
                    .iter()
                    .map(|(label, selector)| (label.to_string(), selector.to_string()))
                    .collect();

                assert_that(&selectors).is_equal_to(expected);
            }
        )+
    }
}

/// Answers every chat with a fixed response and remembers the prompts.
pub(crate) struct StubLlmProvider {
    response: Result<String, String>,
    prompts: Mutex<Vec<String>>,
}

impl StubLlmProvider {
    pub fn new(response_content: impl Into<String>) -> Self {
        StubLlmProvider {
            response: Ok(response_content.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        StubLlmProvider {
            response: Err(message.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts mutex").clone()
    }
}

impl ChatProvider for StubLlmProvider {
    fn chat<'life0, 'life1, 'async_trait>(
        &'life0 self,
        messages: &'life1 [ChatMessage],
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Box<dyn ChatResponse>, LLMError>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        self.prompts
            .lock()
            .expect("prompts mutex")
            .extend(messages.iter().map(|message| message.content.clone()));

        Box::pin(async move {
            #[derive(Debug)]
            struct StringResponse(String);

            impl ChatResponse for StringResponse {
                fn text(&self) -> Option<String> {
                    Some(self.0.clone())
                }

                fn tool_calls(&self) -> Option<Vec<llm::ToolCall>> {
                    panic!()
                }

                fn thinking(&self) -> Option<String> {
                    None
                }

                fn usage(&self) -> Option<llm::chat::Usage> {
                    None
                }
            }

            impl std::fmt::Display for StringResponse {
                fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(formatter, "{}", self.0)
                }
            }

            match &self.response {
                Ok(content) => {
                    Ok(Box::new(StringResponse(content.clone())) as Box<dyn ChatResponse>)
                }
                Err(message) => Err(LLMError::ProviderError(message.clone())),
            }
        })
    }

    fn chat_with_tools<'life0, 'life1, 'life2, 'async_trait>(
        &'life0 self,
        _messages: &'life1 [ChatMessage],
        _tools: Option<&'life2 [Tool]>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Box<dyn ChatResponse>, LLMError>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        'life2: 'async_trait,
        Self: 'async_trait,
    {
        panic!()
    }
}
