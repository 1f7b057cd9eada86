use log::{debug, warn};
use num_traits::Num;
use thiserror::Error;

use crate::A2lError;
use crate::tokenizer::{A2lToken, A2lTokenType, TokenPosition, Tokenizer, TokenizerError};

pub struct ParserState<'a> {
    tokenizer: Tokenizer<'a>,
    pub(crate) last_token_position: u32,
    pub(crate) log_msgs: Vec<A2lError>,
    strict: bool,
}

/// describes the current parser context, giving the name of the current element and its line number
#[derive(Debug, Clone)]
pub struct ParseContext {
    pub element: String,
    pub line: u32,
}

/// how a keyword of a block may appear: only as `/begin KEYWORD ... /end KEYWORD`, only as a
/// plain keyword, or both ways
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockUse {
    Required,
    Forbidden,
    Either,
}

#[derive(Debug, Clone, Copy)]
enum UnknownPolicy {
    Error,
    Warn,
    Ignore,
}

pub(crate) type KeywordHandler<T> =
    fn(&mut ParserState<'_>, &ParseContext, &mut T) -> Result<(), ParserError>;

/// one entry of the keyword dispatch table of a block
///
/// Entries without a handler are accepted but skipped: a keyword skips `params` tokens, a block
/// is skipped completely.
pub(crate) struct Keyword<T: 'static> {
    pub(crate) name: &'static str,
    pub(crate) block: BlockUse,
    pub(crate) params: usize,
    pub(crate) max_count: Option<u32>,
    pub(crate) handler: Option<KeywordHandler<T>>,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParserError {
    #[error("{filename}:{error_line}: expected token of type {expected_ttype:?}, got {actual_ttype:?} (\"{actual_text}\") inside block {element} starting on line {block_line}")]
    UnexpectedTokenType {
        filename: String,
        error_line: u32,
        block_line: u32,
        element: String,
        actual_ttype: A2lTokenType,
        actual_text: String,
        expected_ttype: A2lTokenType,
    },

    #[error("{filename}:{error_line}: string \"{numstr}\" could not be interpreted as a number")]
    MalformedNumber {
        filename: String,
        error_line: u32,
        numstr: String,
    },

    #[error("{filename}:{error_line}: expected an enum value, but \"{enumtxt}\" is not part of the enum (located inside block {block} starting on line {block_line})")]
    InvalidEnumValue {
        filename: String,
        error_line: u32,
        enumtxt: String,
        block: String,
        block_line: u32,
    },

    #[error("{filename}:{error_line}: \"{tag}\" already defined in block {block} starting on line {block_line}")]
    AlreadyDefined {
        filename: String,
        error_line: u32,
        tag: String,
        block: String,
        block_line: u32,
    },

    #[error("{filename}:{error_line}: optional element {tag} occurs too often within block {block} starting on line {block_line}")]
    InvalidMultiplicityTooMany {
        filename: String,
        error_line: u32,
        tag: String,
        block: String,
        block_line: u32,
    },

    #[error("{filename}:{error_line}: element {tag} in block {block} starting on line {block_line} must be enclosed in /begin and /end")]
    IncorrectBlockError {
        filename: String,
        error_line: u32,
        tag: String,
        block: String,
        block_line: u32,
    },

    #[error("{filename}:{error_line}: element {tag} in block {block} starting on line {block_line} may not be enclosed in /begin and /end")]
    IncorrectKeywordError {
        filename: String,
        error_line: u32,
        tag: String,
        block: String,
        block_line: u32,
    },

    #[error("{filename}:{error_line}: expecting a \"/end\" not a \"{text}\" at the end of block {block} starting on line {block_line}")]
    ExpectedEnd {
        filename: String,
        error_line: u32,
        text: String,
        block: String,
        block_line: u32,
    },

    #[error("{filename}:{error_line}: expecting a \"{block}\" not a \"{tag}\" after /end of the block starting on line {block_line}")]
    IncorrectEndTag {
        filename: String,
        error_line: u32,
        tag: String,
        block: String,
        block_line: u32,
    },

    #[error("{filename}:{error_line}: Unknown sub-block {tag} found inside block {block} starting on line {block_line}")]
    UnknownSubBlock {
        filename: String,
        error_line: u32,
        tag: String,
        block: String,
        block_line: u32,
    },

    #[error("{filename}:{error_line}: encountered end of file while not done parsing block {block} starting on line {block_line}")]
    UnexpectedEOF {
        filename: String,
        error_line: u32,
        block: String,
        block_line: u32,
    },

    #[error("{filename}:{error_line}: /begin in block {block} is not followed by a valid tag")]
    InvalidBegin {
        filename: String,
        error_line: u32,
        block: String,
    },

    #[error("{filename}:{error_line}: wrong parameter count for {tag} in block {block}: found \"{text}\"")]
    WrongParameterCount {
        filename: String,
        error_line: u32,
        tag: String,
        block: String,
        text: String,
    },

    #[error("{filename}:{error_line}: expecting a value pair in {block} starting on line {block_line}")]
    MissingValuePair {
        filename: String,
        error_line: u32,
        block: String,
        block_line: u32,
    },

    #[error("{filename}:{error_line}: only one IF_DATA XCP allowed in MODULE")]
    DuplicateIfDataXcp { filename: String, error_line: u32 },

    #[error("{filename}:{error_line}: {blockname} \"{name}\" is defined more than once, the definition on line {first_line} is used")]
    DuplicateName {
        filename: String,
        error_line: u32,
        blockname: String,
        name: String,
        first_line: u32,
    },

    /// `AdditionalTokensError` parsing finished without consuming all data in the file
    #[error("{filename}:{error_line}: unexpected additional data \"{text}...\" after parsed a2l file content")]
    AdditionalTokensError {
        filename: String,
        error_line: u32,
        text: String,
    },

    /// `MissingVersionInfo`: no version information in the file
    #[error("File is not recognized as an a2l file. Mandatory version information is missing.")]
    MissingVersionInfo,

    #[error("{filename}: the file does not contain a PROJECT")]
    MissingProject { filename: String },

    #[error(transparent)]
    Tokenizer(#[from] TokenizerError),
}

impl<'a> ParserState<'a> {
    pub(crate) fn new(filename: &str, filetext: &'a str, strict: bool) -> Self {
        Self {
            tokenizer: Tokenizer::new(filename, filetext),
            last_token_position: 1,
            log_msgs: Vec::new(),
            strict,
        }
    }

    pub(crate) fn filename(&self) -> &str {
        self.tokenizer.filename()
    }

    pub(crate) fn take_log_msgs(&mut self) -> Vec<A2lError> {
        std::mem::take(&mut self.log_msgs)
    }

    // get_token
    // get one token from the input. Reaching the end of the input here is always an error
    pub(crate) fn get_token(&mut self, context: &ParseContext) -> Result<A2lToken<'a>, ParserError> {
        if let Some(token) = self.tokenizer.next_token()? {
            self.last_token_position = token.line;
            Ok(token)
        } else {
            Err(ParserError::unexpected_eof(self, context))
        }
    }

    // peek_token
    // look at the next token without consuming it. None means end of input
    pub(crate) fn peek_token(&mut self) -> Result<Option<A2lToken<'a>>, ParserError> {
        let pos = self.tokenizer.tell();
        let token = self.tokenizer.next_token()?;
        self.tokenizer.seek(pos);
        Ok(token)
    }

    pub(crate) fn get_tokenpos(&self) -> TokenPosition {
        self.tokenizer.tell()
    }

    pub(crate) fn set_tokenpos(&mut self, pos: TokenPosition) {
        self.tokenizer.seek(pos);
    }

    pub(crate) fn log_warning(&mut self, parse_error: ParserError) {
        warn!("{parse_error}");
        self.log_msgs.push(A2lError::ParserError {
            parser_error: parse_error,
        });
    }

    pub(crate) fn error_or_log(&mut self, err: ParserError) -> Result<(), ParserError> {
        if self.strict {
            Err(err)
        } else {
            self.log_warning(err);
            Ok(())
        }
    }

    // expect_token get a token which has to be of a particular type (hence: expect)
    // getting a token of any other type is a ParserError
    pub(crate) fn expect_token(
        &mut self,
        context: &ParseContext,
        token_type: A2lTokenType,
    ) -> Result<A2lToken<'a>, ParserError> {
        let token = self.get_token(context)?;

        if token.ttype != token_type {
            return Err(ParserError::unexpected_token_type(
                self, context, &token, token_type,
            ));
        }

        Ok(token)
    }

    // get_string()
    // Get the content of a String token as a string
    pub(crate) fn get_string(&mut self, context: &ParseContext) -> Result<String, ParserError> {
        let token = self.get_token(context)?;
        if token.ttype == A2lTokenType::Identifier {
            // an identifier can be used in place of a string, if the parser is not strict
            self.error_or_log(ParserError::unexpected_token_type(
                self,
                context,
                &token,
                A2lTokenType::String,
            ))?;
            return Ok(token.text.to_string());
        }

        let text = token
            .text
            .strip_prefix('"')
            .and_then(|txt| txt.strip_suffix('"'))
            .unwrap_or(token.text);
        Ok(unescape_string(text))
    }

    // get_identifier()
    // Get the content of an Identifier token as a string
    pub(crate) fn get_identifier(&mut self, context: &ParseContext) -> Result<String, ParserError> {
        let token = self.expect_token(context, A2lTokenType::Identifier)?;
        if token.text == "/begin" || token.text == "/end" {
            return Err(ParserError::unexpected_token_type(
                self,
                context,
                &token,
                A2lTokenType::Identifier,
            ));
        }
        Ok(token.text.to_string())
    }

    // get_integer()
    // decimal and hex (0x) notation is accepted for all integer types
    pub(crate) fn get_integer<T: Num>(&mut self, context: &ParseContext) -> Result<T, ParserError> {
        let token = self.expect_token(context, A2lTokenType::Identifier)?;
        let text = token.text;
        let result = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            T::from_str_radix(hex, 16)
        } else {
            T::from_str_radix(text, 10)
        };
        result.map_err(|_| ParserError::malformed_number(self, context, text))
    }

    // get_double()
    // some vendor tools write limits of integer objects as 0xNNN, so hex input is accepted here as well
    pub(crate) fn get_double(&mut self, context: &ParseContext) -> Result<f64, ParserError> {
        let token = self.expect_token(context, A2lTokenType::Identifier)?;
        let text = token.text;
        let result = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            u64::from_str_radix(hex, 16).map(|num| num as f64).ok()
        } else {
            text.parse::<f64>().ok()
        };
        result.ok_or_else(|| ParserError::malformed_number(self, context, text))
    }

    // get_enum()
    // read an identifier and map it to an enum item using the given lookup function
    pub(crate) fn get_enum<E>(
        &mut self,
        context: &ParseContext,
        lookup: fn(&str) -> Option<E>,
    ) -> Result<E, ParserError> {
        let token = self.expect_token(context, A2lTokenType::Identifier)?;
        lookup(token.text).ok_or_else(|| ParserError::invalid_enum_value(self, context, token.text))
    }

    // next_is_number()
    // check if the next token could be parsed as a number; used for lists of unspecified length
    pub(crate) fn next_is_number(&mut self) -> Result<bool, ParserError> {
        Ok(match self.peek_token()? {
            Some(A2lToken {
                ttype: A2lTokenType::Identifier,
                text,
                ..
            }) => text.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+' || c == '.'),
            _ => false,
        })
    }

    // get_identifier_list()
    // read identifiers until a /begin or /end (or the end of input) is reached
    pub(crate) fn get_identifier_list(
        &mut self,
        context: &ParseContext,
    ) -> Result<Vec<String>, ParserError> {
        let mut list = Vec::new();
        while let Some(token) = self.peek_token()? {
            if token.ttype != A2lTokenType::Identifier
                || token.text == "/begin"
                || token.text == "/end"
            {
                break;
            }
            list.push(self.get_identifier(context)?);
        }
        Ok(list)
    }

    // expect_end()
    // the block described by the context must be closed by /end <element>
    pub(crate) fn expect_end(&mut self, context: &ParseContext) -> Result<(), ParserError> {
        let token = self.get_token(context)?;
        if token.text != "/end" {
            return Err(ParserError::ExpectedEnd {
                filename: self.filename().to_string(),
                error_line: self.last_token_position,
                text: token.text.to_string(),
                block: context.element.clone(),
                block_line: context.line,
            });
        }
        let tag = self.get_token(context)?;
        if tag.text != context.element {
            return Err(ParserError::incorrect_end_tag(self, context, tag.text));
        }
        Ok(())
    }

    // parse_block_body()
    // handle all optional keywords and sub-blocks of a block until the /end of the block
    pub(crate) fn parse_block_body<T>(
        &mut self,
        context: &ParseContext,
        table: &[Keyword<T>],
        target: &mut T,
    ) -> Result<(), ParserError> {
        let mut counts = vec![0u32; table.len()];
        let unknown = if self.strict {
            UnknownPolicy::Error
        } else {
            UnknownPolicy::Warn
        };
        while self.parse_optional(context, table, &mut counts, target, unknown)? {}
        Ok(())
    }

    // parse_ifdata_body()
    // IF_DATA content is vendor specific: unknown elements are always skipped, even in strict mode
    pub(crate) fn parse_ifdata_body<T>(
        &mut self,
        context: &ParseContext,
        table: &[Keyword<T>],
        target: &mut T,
    ) -> Result<(), ParserError> {
        let mut counts = vec![0u32; table.len()];
        while self.parse_optional(context, table, &mut counts, target, UnknownPolicy::Ignore)? {}
        Ok(())
    }

    // parse_optional()
    // Try to handle the next keyword or block using the table of the current block.
    // Returns false if the next token does not belong to the table (e.g. the /end of the current
    // block), in which case the input is rewound to the state before the call.
    fn parse_optional<T>(
        &mut self,
        context: &ParseContext,
        table: &[Keyword<T>],
        counts: &mut [u32],
        target: &mut T,
        unknown: UnknownPolicy,
    ) -> Result<bool, ParserError> {
        let startpos = self.get_tokenpos();
        let Some(first) = self.tokenizer.next_token()? else {
            self.set_tokenpos(startpos);
            return Ok(false);
        };
        if first.text == "/end" {
            self.set_tokenpos(startpos);
            return Ok(false);
        }

        let is_block = first.text == "/begin";
        let tag = if is_block {
            match self.tokenizer.next_token()? {
                Some(token)
                    if token.ttype == A2lTokenType::Identifier
                        && token.text != "/begin"
                        && token.text != "/end" =>
                {
                    token
                }
                _ => {
                    return Err(ParserError::InvalidBegin {
                        filename: self.filename().to_string(),
                        error_line: first.line,
                        block: context.element.clone(),
                    });
                }
            }
        } else {
            first
        };
        self.last_token_position = tag.line;

        let Some(idx) = table.iter().position(|kw| kw.name == tag.text) else {
            let tag_context = ParseContext::from_token(&tag);
            match unknown {
                UnknownPolicy::Error => {
                    if is_block {
                        return Err(ParserError::unknown_sub_block(self, context, tag.text));
                    }
                    // not part of this block; the caller reports it when it expects the /end
                    self.set_tokenpos(startpos);
                    return Ok(false);
                }
                UnknownPolicy::Warn => {
                    self.log_warning(ParserError::unknown_sub_block(self, context, tag.text));
                }
                UnknownPolicy::Ignore => {
                    debug!("skipping {} inside {}", tag.text, context.element);
                }
            }
            if is_block {
                self.skip_block(&tag_context)?;
            } else {
                self.skip_unknown_keyword(table)?;
            }
            return Ok(true);
        };

        let keyword = &table[idx];
        let tag_context = ParseContext::from_token(&tag);
        match (keyword.block, is_block) {
            (BlockUse::Required, false) => {
                return Err(ParserError::IncorrectBlockError {
                    filename: self.filename().to_string(),
                    error_line: tag.line,
                    tag: tag.text.to_string(),
                    block: context.element.clone(),
                    block_line: context.line,
                });
            }
            (BlockUse::Forbidden, true) => {
                return Err(ParserError::IncorrectKeywordError {
                    filename: self.filename().to_string(),
                    error_line: tag.line,
                    tag: tag.text.to_string(),
                    block: context.element.clone(),
                    block_line: context.line,
                });
            }
            _ => {}
        }

        counts[idx] += 1;
        if let Some(max_count) = keyword.max_count {
            if counts[idx] > max_count {
                let err = if max_count == 1 {
                    ParserError::AlreadyDefined {
                        filename: self.filename().to_string(),
                        error_line: tag.line,
                        tag: tag.text.to_string(),
                        block: context.element.clone(),
                        block_line: context.line,
                    }
                } else {
                    ParserError::invalid_multiplicity_too_many(self, context, tag.text)
                };
                return Err(err);
            }
        }

        if let Some(handler) = keyword.handler {
            handler(self, &tag_context, target)?;
        } else if is_block {
            self.skip_block_content(&tag_context)?;
        } else {
            for _ in 0..keyword.params {
                let token = self.get_token(&tag_context)?;
                if token.text == "/begin" || token.text == "/end" {
                    return Err(ParserError::WrongParameterCount {
                        filename: self.filename().to_string(),
                        error_line: token.line,
                        tag: tag.text.to_string(),
                        block: context.element.clone(),
                        text: token.text.to_string(),
                    });
                }
            }
        }

        if is_block {
            self.expect_end(&tag_context)?;
        }

        Ok(true)
    }

    // skip_block()
    // skip a complete block whose /begin TAG has already been consumed, including its /end TAG
    pub(crate) fn skip_block(&mut self, context: &ParseContext) -> Result<(), ParserError> {
        self.skip_block_content(context)?;
        self.expect_end(context)
    }

    // skip_block_content()
    // skip everything up to (but not including) the /end that matches the current block
    pub(crate) fn skip_block_content(&mut self, context: &ParseContext) -> Result<(), ParserError> {
        let mut depth = 0u32;
        loop {
            let pos = self.get_tokenpos();
            let token = self.get_token(context)?;
            match token.text {
                "/begin" => depth += 1,
                "/end" => {
                    if depth == 0 {
                        self.set_tokenpos(pos);
                        return Ok(());
                    }
                    depth -= 1;
                    // consume the tag of the nested block
                    self.get_token(context)?;
                }
                _ => {}
            }
        }
    }

    // skip_unknown_keyword()
    // skip the parameters of an unknown keyword: everything up to the next /begin, /end or known keyword
    fn skip_unknown_keyword<T>(&mut self, table: &[Keyword<T>]) -> Result<(), ParserError> {
        loop {
            let pos = self.get_tokenpos();
            match self.tokenizer.next_token()? {
                None => return Ok(()),
                Some(token) => {
                    if token.ttype == A2lTokenType::Identifier
                        && (token.text == "/begin"
                            || token.text == "/end"
                            || table.iter().any(|kw| kw.name == token.text))
                    {
                        self.set_tokenpos(pos);
                        return Ok(());
                    }
                }
            }
        }
    }

    // check_end_of_input()
    // after the complete file has been parsed, no further tokens may follow
    pub(crate) fn check_end_of_input(&mut self) -> Result<(), ParserError> {
        if let Some(token) = self.peek_token()? {
            self.error_or_log(ParserError::AdditionalTokensError {
                filename: self.filename().to_string(),
                error_line: token.line,
                text: token.text.chars().take(40).collect(),
            })?;
        }
        Ok(())
    }
}

impl ParseContext {
    pub(crate) fn from_token(token: &A2lToken) -> ParseContext {
        ParseContext {
            element: token.text.to_string(),
            line: token.line,
        }
    }
}

impl ParserError {
    pub(crate) fn unexpected_token_type(
        parser: &ParserState,
        context: &ParseContext,
        token: &A2lToken,
        expected_ttype: A2lTokenType,
    ) -> Self {
        Self::UnexpectedTokenType {
            filename: parser.filename().to_string(),
            error_line: parser.last_token_position,
            block_line: context.line,
            element: context.element.clone(),
            actual_ttype: token.ttype,
            actual_text: token.text.to_owned(),
            expected_ttype,
        }
    }

    pub(crate) fn malformed_number(
        parser: &ParserState,
        _context: &ParseContext,
        numstr: &str,
    ) -> Self {
        Self::MalformedNumber {
            filename: parser.filename().to_string(),
            error_line: parser.last_token_position,
            numstr: numstr.to_owned(),
        }
    }

    pub(crate) fn invalid_enum_value(
        parser: &ParserState,
        context: &ParseContext,
        enumitem: &str,
    ) -> Self {
        Self::InvalidEnumValue {
            filename: parser.filename().to_string(),
            error_line: parser.last_token_position,
            enumtxt: enumitem.to_owned(),
            block: context.element.clone(),
            block_line: context.line,
        }
    }

    pub(crate) fn invalid_multiplicity_too_many(
        parser: &ParserState,
        context: &ParseContext,
        tag: &str,
    ) -> Self {
        Self::InvalidMultiplicityTooMany {
            filename: parser.filename().to_string(),
            error_line: parser.last_token_position,
            tag: tag.to_string(),
            block: context.element.clone(),
            block_line: context.line,
        }
    }

    pub(crate) fn incorrect_end_tag(
        parser: &ParserState,
        context: &ParseContext,
        tag: &str,
    ) -> Self {
        Self::IncorrectEndTag {
            filename: parser.filename().to_string(),
            error_line: parser.last_token_position,
            tag: tag.to_owned(),
            block: context.element.clone(),
            block_line: context.line,
        }
    }

    pub(crate) fn unknown_sub_block(
        parser: &ParserState,
        context: &ParseContext,
        tag: &str,
    ) -> Self {
        Self::UnknownSubBlock {
            filename: parser.filename().to_string(),
            error_line: parser.last_token_position,
            tag: tag.to_owned(),
            block: context.element.clone(),
            block_line: context.line,
        }
    }

    pub(crate) fn unexpected_eof(parser: &ParserState, context: &ParseContext) -> Self {
        Self::UnexpectedEOF {
            filename: parser.filename().to_string(),
            error_line: parser.last_token_position,
            block: context.element.clone(),
            block_line: context.line,
        }
    }

    pub(crate) fn missing_value_pair(parser: &ParserState, context: &ParseContext) -> Self {
        Self::MissingValuePair {
            filename: parser.filename().to_string(),
            error_line: parser.last_token_position,
            block: context.element.clone(),
            block_line: context.line,
        }
    }
}

// strings may contain the escape sequences \" "" \' \\ \n \r \t
fn unescape_string(text: &str) -> String {
    if !text.contains(['\\', '"']) {
        return text.to_owned();
    }

    let mut output = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        let replacement = match (c, chars.peek()) {
            ('\\' | '"', Some('"')) => Some('"'),
            ('\\', Some('\'')) => Some('\''),
            ('\\', Some('\\')) => Some('\\'),
            ('\\', Some('n')) => Some('\n'),
            ('\\', Some('r')) => Some('\r'),
            ('\\', Some('t')) => Some('\t'),
            _ => None,
        };
        if let Some(replacement) = replacement {
            output.push(replacement);
            chars.next();
        } else {
            output.push(c);
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_context() -> ParseContext {
        ParseContext {
            element: "TEST".to_string(),
            line: 1,
        }
    }

    #[derive(Default)]
    struct TestBlock {
        value: Option<u32>,
        names: Vec<String>,
    }

    fn parse_value(
        parser: &mut ParserState,
        context: &ParseContext,
        item: &mut TestBlock,
    ) -> Result<(), ParserError> {
        item.value = Some(parser.get_integer(context)?);
        Ok(())
    }

    fn parse_name(
        parser: &mut ParserState,
        context: &ParseContext,
        item: &mut TestBlock,
    ) -> Result<(), ParserError> {
        item.names.push(parser.get_string(context)?);
        Ok(())
    }

    const TEST_KEYWORDS: &[Keyword<TestBlock>] = &[
        Keyword {
            name: "VALUE",
            block: BlockUse::Forbidden,
            params: 1,
            max_count: Some(1),
            handler: Some(parse_value),
        },
        Keyword {
            name: "NAME",
            block: BlockUse::Either,
            params: 1,
            max_count: None,
            handler: Some(parse_name),
        },
        Keyword {
            name: "SKIPPED",
            block: BlockUse::Forbidden,
            params: 2,
            max_count: None,
            handler: None,
        },
        Keyword {
            name: "SKIPPED_BLOCK",
            block: BlockUse::Required,
            params: 0,
            max_count: None,
            handler: None,
        },
    ];

    fn parse_test_block(text: &str, strict: bool) -> Result<TestBlock, ParserError> {
        let mut parser = ParserState::new("test_input", text, strict);
        let context = test_context();
        let mut block = TestBlock::default();
        parser.parse_block_body(&context, TEST_KEYWORDS, &mut block)?;
        parser.expect_end(&context)?;
        Ok(block)
    }

    #[test]
    fn parsing_numbers_test() {
        let input_text = r##"0 0x1 1.0e+2 1000 -5 0x11 0X1f 2F F 0xffffffff"##;
        let mut parser = ParserState::new("test_input", input_text, true);
        let context = test_context();

        assert_eq!(parser.get_integer::<u8>(&context).unwrap(), 0);
        assert_eq!(parser.get_integer::<u8>(&context).unwrap(), 1);
        assert!(parser.get_integer::<u8>(&context).is_err());
        assert!(parser.get_integer::<u8>(&context).is_err());
        assert_eq!(parser.get_integer::<i32>(&context).unwrap(), -5);
        assert_eq!(parser.get_double(&context).unwrap(), 17.0);
        assert_eq!(parser.get_double(&context).unwrap(), 31.0);
        assert!(parser.get_double(&context).is_err());
        assert!(parser.get_double(&context).is_err());
        assert_eq!(parser.get_integer::<u32>(&context).unwrap(), 0xffff_ffff);
        assert!(matches!(
            parser.get_double(&context),
            Err(ParserError::UnexpectedEOF { .. })
        ));
    }

    #[test]
    fn test_unescape_string() {
        assert_eq!(unescape_string("abc"), "abc");
        assert_eq!(unescape_string(r#"a\"b"#), "a\"b");
        assert_eq!(unescape_string(r#"a""b"#), "a\"b");
        assert_eq!(unescape_string(r"a\nb\tc"), "a\nb\tc");
        assert_eq!(unescape_string(r"a\\b"), "a\\b");
        assert_eq!(unescape_string(r"a\'b"), "a'b");
        assert_eq!(unescape_string("trailing\\"), "trailing\\");
    }

    #[test]
    fn parsing_strings_and_identifiers() {
        let mut parser = ParserState::new("test_input", r#""quoted text" ident /end"#, true);
        let context = test_context();
        assert_eq!(parser.get_string(&context).unwrap(), "quoted text");
        assert!(parser.get_string(&context).is_err());

        let mut parser = ParserState::new("test_input", r#"ident /end"#, false);
        assert_eq!(parser.get_string(&context).unwrap(), "ident");
        assert_eq!(parser.log_msgs.len(), 1);
        assert!(parser.get_identifier(&context).is_err());
    }

    #[test]
    fn keyword_dispatch() {
        let block = parse_test_block(
            r#"VALUE 7 SKIPPED 1 2 NAME "a" /begin NAME "b" /end NAME
               /begin SKIPPED_BLOCK /begin INNER x /end INNER /end SKIPPED_BLOCK
               /end TEST"#,
            true,
        )
        .unwrap();
        assert_eq!(block.value, Some(7));
        assert_eq!(block.names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn keyword_dispatch_errors() {
        let result = parse_test_block("VALUE 1 VALUE 2 /end TEST", true);
        assert!(matches!(result, Err(ParserError::AlreadyDefined { .. })));
        let message = result.err().unwrap().to_string();
        assert!(message.contains("\"VALUE\" already defined"));

        let result = parse_test_block("/begin VALUE 1 /end VALUE /end TEST", true);
        assert!(matches!(result, Err(ParserError::IncorrectKeywordError { .. })));

        let result = parse_test_block("SKIPPED_BLOCK /end TEST", true);
        assert!(matches!(result, Err(ParserError::IncorrectBlockError { .. })));

        let result = parse_test_block("SKIPPED 1 /end TEST", true);
        assert!(matches!(result, Err(ParserError::WrongParameterCount { .. })));

        let result = parse_test_block("VALUE 1 /end OTHER", true);
        assert!(matches!(result, Err(ParserError::IncorrectEndTag { .. })));

        let result = parse_test_block("VALUE 1", true);
        assert!(matches!(result, Err(ParserError::UnexpectedEOF { .. })));

        let result = parse_test_block("/begin /end TEST", true);
        assert!(matches!(result, Err(ParserError::InvalidBegin { .. })));
    }

    #[test]
    fn unknown_elements() {
        let text = "UNKNOWN_KW 1 2 VALUE 3 /begin UNKNOWN_BLOCK /begin X /end X /end UNKNOWN_BLOCK /end TEST";
        let result = parse_test_block(text, true);
        assert!(matches!(result, Err(ParserError::ExpectedEnd { .. })));
        let result = parse_test_block("/begin UNKNOWN_BLOCK /end UNKNOWN_BLOCK /end TEST", true);
        assert!(matches!(result, Err(ParserError::UnknownSubBlock { .. })));

        let mut parser = ParserState::new("test_input", text, false);
        let context = test_context();
        let mut block = TestBlock::default();
        parser
            .parse_block_body(&context, TEST_KEYWORDS, &mut block)
            .unwrap();
        parser.expect_end(&context).unwrap();
        assert_eq!(block.value, Some(3));
        assert_eq!(parser.take_log_msgs().len(), 2);
    }
}
