use super::{SummaryRequest, Summarizer};
use crate::{Error, Result, config::SummarizerConfig};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use tracing::debug;

const DEFAULT_SYSTEM_PROMPT: &str = "You write scene descriptions for album cover art. \
Read the album details and answer with one short English phrase (at most 12 words) \
describing the mood and setting of the cover. Do not mention the artist, do not use \
quotes, and do not end with a period.";

pub struct OpenAiSummarizer {
    client: Client<OpenAIConfig>,
    model: String,
    system_prompt: String,
    temperature: f32,
}

impl OpenAiSummarizer {
    pub fn new(config: SummarizerConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(config.api_key);

        if !config.base_url.is_empty() {
            openai_config = openai_config.with_api_base(config.base_url);
        }

        Self {
            client: Client::with_config(openai_config),
            model: config.model,
            system_prompt: config
                .system_prompt
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            temperature: config.temperature.unwrap_or(0.7),
        }
    }

    fn messages(&self, request: &SummaryRequest) -> Result<Vec<ChatCompletionRequestMessage>> {
        let system = ChatCompletionRequestSystemMessageArgs::default()
            .content(self.system_prompt.clone())
            .build()
            .map_err(|e| Error::summarize(format!("Failed to build system message: {e}")))?;

        let user = ChatCompletionRequestUserMessageArgs::default()
            .content(describe_album(request))
            .build()
            .map_err(|e| Error::summarize(format!("Failed to build user message: {e}")))?;

        Ok(vec![system.into(), user.into()])
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(&self, request: SummaryRequest) -> Result<String> {
        debug!("Summarizing album '{}' with {}", request.album_name, self.model);

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(self.messages(&request)?)
            .temperature(self.temperature)
            .build()?;

        let response = self.client.chat().create(chat_request).await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::summarize("completion returned no content"))?;

        let summary = clean_summary(&content);
        if summary.is_empty() {
            return Err(Error::summarize("completion returned an empty summary"));
        }

        debug!("Scene summary: {}", summary);
        Ok(summary)
    }
}

fn describe_album(request: &SummaryRequest) -> String {
    format!(
        "Artist: {}\nAlbum: {}\nGenre: {}\nSongs: {}\nSinger gender: {}\nLyrics:\n{}",
        request.artist_name,
        request.album_name,
        request.genre,
        request.song_names.join(", "),
        request.gender,
        request.lyric
    )
}

/// Strips whitespace, wrapping quotes and trailing periods so the summary
/// slots into the middle of a sentence.
pub(crate) fn clean_summary(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .trim_end_matches('.')
        .trim()
        .to_string()
}
