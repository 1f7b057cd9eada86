use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TokenizerError {
    #[error("{filename}:{line}: File ends inside a comment, */ is missing")]
    UnclosedComment { filename: String, line: u32 },

    #[error("{filename}:{line}: String was not closed before the end of input was reached")]
    UnclosedString { filename: String, line: u32 },
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum A2lTokenType {
    /// any bare word: identifiers, numbers, `/begin` and `/end`
    Identifier,
    /// a quoted string; the token text includes the quotes
    String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct A2lToken<'a> {
    pub ttype: A2lTokenType,
    pub text: &'a str,
    pub startpos: usize,
    pub line: u32,
}

/// a saved lexer position, see [`Tokenizer::tell`] and [`Tokenizer::seek`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPosition {
    pub offset: usize,
    pub line: u32,
}

// Streaming tokenizer for a2l text.
// During tokenization the text is treated as ASCII, even though it is actually UTF-8. This works
// because characters outside of basic ASCII can only occur in strings and comments.
// Every token carries its source line so that parser errors can give accurate location info.
pub struct Tokenizer<'a> {
    filename: String,
    filetext: &'a str,
    bytepos: usize,
    line: u32,
    eof: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(filename: &str, filetext: &'a str) -> Self {
        let filetext = filetext.strip_prefix('\u{feff}').unwrap_or(filetext);
        Self {
            filename: filename.to_string(),
            filetext,
            bytepos: 0,
            line: 1,
            eof: false,
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn tell(&self) -> TokenPosition {
        TokenPosition {
            offset: self.bytepos,
            line: self.line,
        }
    }

    pub fn seek(&mut self, pos: TokenPosition) {
        self.bytepos = pos.offset.min(self.filetext.len());
        self.line = pos.line;
        self.eof = false;
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// get the next token
    ///
    /// Returns `Ok(None)` once the end of the input has been reached. The end of input state is
    /// sticky: all further calls return `Ok(None)` until [`Tokenizer::seek`] is called.
    pub fn next_token(&mut self) -> Result<Option<A2lToken<'a>>, TokenizerError> {
        if self.eof {
            return Ok(None);
        }
        self.skip_separators()?;

        let filetext = self.filetext;
        let filebytes = filetext.as_bytes();
        let datalen = filebytes.len();
        if self.bytepos >= datalen {
            self.eof = true;
            return Ok(None);
        }

        let startpos = self.bytepos;
        let line = self.line;
        if filebytes[startpos] == b'"' {
            let endpos = find_string_end(filebytes, startpos + 1).map_err(|()| {
                TokenizerError::UnclosedString {
                    filename: self.filename.clone(),
                    line,
                }
            })?;
            self.line += count_newlines(&filebytes[startpos..endpos]);
            self.bytepos = endpos;
            Ok(Some(A2lToken {
                ttype: A2lTokenType::String,
                text: &filetext[startpos..endpos],
                startpos,
                line,
            }))
        } else {
            let mut endpos = startpos + 1;
            while endpos < datalen && !is_token_end(filebytes, endpos) {
                endpos += 1;
            }
            self.bytepos = endpos;
            Ok(Some(A2lToken {
                ttype: A2lTokenType::Identifier,
                text: &filetext[startpos..endpos],
                startpos,
                line,
            }))
        }
    }

    // skip whitespace, block comments and line comments
    fn skip_separators(&mut self) -> Result<(), TokenizerError> {
        let filetext = self.filetext;
        let filebytes = filetext.as_bytes();
        let datalen = filebytes.len();

        while self.bytepos < datalen {
            let startpos = self.bytepos;
            if is_whitespace(filebytes[startpos]) {
                while self.bytepos < datalen && is_whitespace(filebytes[self.bytepos]) {
                    self.bytepos += 1;
                }
                self.line += count_newlines(&filebytes[startpos..self.bytepos]);
            } else if filebytes[startpos..].starts_with(b"/*") {
                let line = self.line;
                self.bytepos = skip_block_comment(filebytes, startpos + 2).map_err(|()| {
                    self.eof = true;
                    TokenizerError::UnclosedComment {
                        filename: self.filename.clone(),
                        line,
                    }
                })?;
                self.line += count_newlines(&filebytes[startpos..self.bytepos]);
            } else if filebytes[startpos..].starts_with(b"//") {
                while self.bytepos < datalen && filebytes[self.bytepos] != b'\n' {
                    self.bytepos += 1;
                }
            } else {
                break;
            }
        }

        Ok(())
    }
}

// a bare token ends at whitespace, at the start of a string or at the start of a comment
fn is_token_end(filebytes: &[u8], bytepos: usize) -> bool {
    let c = filebytes[bytepos];
    is_whitespace(c)
        || c == b'"'
        || (c == b'/'
            && bytepos + 1 < filebytes.len()
            && (filebytes[bytepos + 1] == b'*' || filebytes[bytepos + 1] == b'/'))
}

fn is_whitespace(c: u8) -> bool {
    c == b' ' || c == b'\t' || c == b'\n' || c == b'\r'
}

// skip_block_comment
// finds the first byte position after the end of a block comment; bytepos points just after the "/*"
fn skip_block_comment(filebytes: &[u8], mut bytepos: usize) -> Result<usize, ()> {
    let datalen = filebytes.len();

    bytepos += 1;
    while bytepos < datalen && !(filebytes[bytepos - 1] == b'*' && filebytes[bytepos] == b'/') {
        bytepos += 1;
    }

    if bytepos >= datalen {
        return Err(());
    }

    Ok(bytepos + 1)
}

// find_string_end
// returns the position after the closing quote. Both \" and "" are escaped quotes.
fn find_string_end(filebytes: &[u8], mut bytepos: usize) -> Result<usize, ()> {
    let datalen = filebytes.len();
    let mut end_found = false;
    let mut prev_quote = false;
    let mut prev_bkslash = false;

    while bytepos < datalen && !end_found {
        if filebytes[bytepos] == b'"' {
            // a quote directly after a quote or a backslash is escaped
            prev_quote = !(prev_quote || prev_bkslash);
            prev_bkslash = false;
        } else {
            if prev_quote {
                end_found = true;
            } else if filebytes[bytepos] == b'\\' {
                // "\\" is a complete escape sequence, a single '\' starts one
                prev_bkslash = !prev_bkslash;
            } else {
                prev_bkslash = false;
            }
            prev_quote = false;
        }
        bytepos += 1;
    }

    if bytepos == datalen && !end_found {
        if prev_quote {
            // the closing quote was the last character of the input
            bytepos += 1;
        } else {
            return Err(());
        }
    }

    Ok(bytepos - 1)
}

fn count_newlines(text: &[u8]) -> u32 {
    text.iter().map(|c| u32::from(*c == b'\n')).sum()
}

/*************************************************************************************************/
