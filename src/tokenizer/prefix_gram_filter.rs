use tantivy::tokenizer::{Token, TokenFilter, TokenStream, Tokenizer};

/// Expands each token into its leading character grams: `"app"` becomes
/// `"a"`, `"ap"`, `"app"`. Grams longer than `max_chars` are not emitted, so a
/// prefix lookup for a longer term must query the longest gram and verify.
#[derive(Clone)]
pub struct PrefixGramFilter {
    max_chars: usize,
}

impl PrefixGramFilter {
    pub fn new(max_chars: usize) -> Self {
        PrefixGramFilter {
            max_chars: max_chars.max(1),
        }
    }
}

impl TokenFilter for PrefixGramFilter {
    type Tokenizer<T: Tokenizer> = PrefixGramTokenizer<T>;

    fn transform<T: Tokenizer>(self, tokenizer: T) -> Self::Tokenizer<T> {
        PrefixGramTokenizer {
            inner: tokenizer,
            max_chars: self.max_chars,
        }
    }
}

#[derive(Clone)]
pub struct PrefixGramTokenizer<T> {
    inner: T,
    max_chars: usize,
}

impl<T: Tokenizer> Tokenizer for PrefixGramTokenizer<T> {
    type TokenStream<'a> = PrefixGramTokenStream<T::TokenStream<'a>>;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> Self::TokenStream<'a> {
        PrefixGramTokenStream {
            inner: self.inner.token_stream(text),
            max_chars: self.max_chars,
            source: Token::default(),
            ends: Vec::new(),
            next_end: 0,
            gram: Token::default(),
        }
    }
}

pub struct PrefixGramTokenStream<T> {
    inner: T,
    max_chars: usize,
    source: Token,
    // byte offsets where each gram of `source` ends
    ends: Vec<usize>,
    next_end: usize,
    gram: Token,
}

impl<T: TokenStream> PrefixGramTokenStream<T> {
    fn load_next_source(&mut self) -> bool {
        while self.inner.advance() {
            let token = self.inner.token();
            if token.text.is_empty() {
                continue;
            }
            self.source = token.clone();
            self.ends = self
                .source
                .text
                .char_indices()
                .skip(1)
                .map(|(i, _)| i)
                .chain(std::iter::once(self.source.text.len()))
                .take(self.max_chars)
                .collect();
            self.next_end = 0;
            return true;
        }
        false
    }
}

impl<T: TokenStream> TokenStream for PrefixGramTokenStream<T> {
    fn advance(&mut self) -> bool {
        if self.next_end >= self.ends.len() && !self.load_next_source() {
            return false;
        }
        let end = self.ends[self.next_end];
        self.next_end += 1;

        self.gram.clone_from(&self.source);
        self.gram.text.truncate(end);
        self.gram.offset_to = self.gram.offset_from + end;
        true
    }

    fn token(&self) -> &Token {
        &self.gram
    }

    fn token_mut(&mut self) -> &mut Token {
        &mut self.gram
    }
}
