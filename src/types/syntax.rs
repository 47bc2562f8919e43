/// The template syntax configuration.
///
/// Use [`Syntax::default()`] to get the default syntax configuration and
/// [`Syntax::builder()`] to create a custom syntax configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Syntax {
    pub(crate) patterns: Vec<(Kind, String)>,
}

/// A builder for the syntax configuration.
///
/// This struct is typically created using [`Syntax::builder()`].
#[derive(Debug, Clone, Default)]
pub struct SyntaxBuilder {
    expr: Option<(String, String)>,
    block: Option<(String, String)>,
    comment: Option<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    BeginExpr,
    EndExpr,
    BeginExprTrim,
    EndExprTrim,
    BeginBlock,
    EndBlock,
    BeginBlockTrim,
    EndBlockTrim,
    BeginComment,
    EndComment,
    BeginCommentTrim,
    EndCommentTrim,
}

impl Default for Syntax {
    /// Returns the default syntax configuration.
    ///
    /// This is equivalent to the following.
    /// ```
    /// use quill::Syntax;
    ///
    /// let syntax = Syntax::builder()
    ///     .expr("{{", "}}")
    ///     .block("{%", "%}")
    ///     .comment("{#", "#}")
    ///     .build();
    /// assert_eq!(syntax, Syntax::default());
    /// ```
    #[inline]
    fn default() -> Self {
        Syntax::builder()
            .expr("{{", "}}")
            .block("{%", "%}")
            .comment("{#", "#}")
            .build()
    }
}

impl Syntax {
    /// Create a new syntax builder.
    ///
    /// # Examples
    ///
    /// ```
    /// let syntax = quill::Syntax::builder()
    ///     .expr("<{", "}>")
    ///     .block("<[", "]>")
    ///     .build();
    /// ```
    #[inline]
    pub fn builder() -> SyntaxBuilder {
        SyntaxBuilder::new()
    }
}

impl SyntaxBuilder {
    /// Creates a new syntax builder.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the expression syntax.
    ///
    /// If not set then the expression syntax will not be available.
    ///
    /// # Panics
    ///
    /// If either of the strings are empty.
    #[inline]
    pub fn expr(&mut self, begin_expr: &str, end_expr: &str) -> &mut Self {
        assert!(!begin_expr.is_empty() && !end_expr.is_empty());
        self.expr = Some((begin_expr.into(), end_expr.into()));
        self
    }

    /// Set the block syntax.
    ///
    /// Directives share the block syntax, so without it only expressions and
    /// comments are available.
    ///
    /// # Panics
    ///
    /// If either of the strings are empty.
    #[inline]
    pub fn block(&mut self, begin_block: &str, end_block: &str) -> &mut Self {
        assert!(!begin_block.is_empty() && !end_block.is_empty());
        self.block = Some((begin_block.into(), end_block.into()));
        self
    }

    /// Set the comment syntax.
    ///
    /// If not set then comment syntax will not be available.
    ///
    /// # Panics
    ///
    /// If either of the strings are empty.
    #[inline]
    pub fn comment(&mut self, begin_comment: &str, end_comment: &str) -> &mut Self {
        assert!(!begin_comment.is_empty() && !end_comment.is_empty());
        self.comment = Some((begin_comment.into(), end_comment.into()));
        self
    }

    /// Builds the syntax configuration.
    pub fn build(&self) -> Syntax {
        let mut patterns = Vec::new();
        if let Some((begin, end)) = &self.expr {
            patterns.push((Kind::BeginExpr, begin.clone()));
            patterns.push((Kind::EndExpr, end.clone()));
            patterns.push((Kind::BeginExprTrim, format!("{begin}-")));
            patterns.push((Kind::EndExprTrim, format!("-{end}")));
        }
        if let Some((begin, end)) = &self.block {
            patterns.push((Kind::BeginBlock, begin.clone()));
            patterns.push((Kind::EndBlock, end.clone()));
            patterns.push((Kind::BeginBlockTrim, format!("{begin}-")));
            patterns.push((Kind::EndBlockTrim, format!("-{end}")));
        }
        if let Some((begin, end)) = &self.comment {
            patterns.push((Kind::BeginComment, begin.clone()));
            patterns.push((Kind::EndComment, end.clone()));
            patterns.push((Kind::BeginCommentTrim, format!("{begin}-")));
            patterns.push((Kind::EndCommentTrim, format!("-{end}")));
        }
        Syntax { patterns }
    }
}
