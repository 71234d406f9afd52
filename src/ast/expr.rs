use crate::ast::HostValue;
use crate::mapping::ModelRef;
use crate::value::{Value, ValueType};

/// Static result type carried by every node.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeRef {
    /// Type not known to the builder that produced the node.
    Unknown,
    Scalar(ValueType),
    /// A mapped row or projection type.
    Model(ModelRef),
    /// A captured host object type.
    Host(String),
    /// A queryable sequence of elements.
    Sequence(Box<TypeRef>),
    /// The element of a grouped sequence.
    Grouping { key: Box<TypeRef>, element: Box<TypeRef> },
}

impl TypeRef {
    pub fn sequence(element: TypeRef) -> Self {
        TypeRef::Sequence(Box::new(element))
    }

    /// Element type of a sequence, `Unknown` for anything else.
    pub fn element(&self) -> TypeRef {
        match self {
            TypeRef::Sequence(element) => (**element).clone(),
            _ => TypeRef::Unknown,
        }
    }

    pub fn scalar(&self) -> Option<ValueType> {
        match self {
            TypeRef::Scalar(vt) => Some(*vt),
            _ => None,
        }
    }

    pub fn model(&self) -> Option<&ModelRef> {
        match self {
            TypeRef::Model(model) => Some(model),
            _ => None,
        }
    }

    /// Type of `field` accessed on a value of this type.
    pub fn member(&self, field: &str) -> TypeRef {
        match self {
            TypeRef::Model(model) => model
                .field(field)
                .and_then(|f| f.value_type())
                .map(TypeRef::Scalar)
                .unwrap_or(TypeRef::Unknown),
            TypeRef::Grouping { key, .. } if field == "Key" => (**key).clone(),
            TypeRef::Scalar(ValueType::Text) if field == "Length" => TypeRef::Scalar(ValueType::Int),
            _ => TypeRef::Unknown,
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let token = match self {
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        };
        f.write_str(token)
    }
}

/// How a `New` node builds its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    /// Default-construct, then assign each member.
    Named,
    /// Call the single positional constructor.
    Positional,
}

/// Payload of a constant node.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Value(Value),
    Host(HostValue),
    /// A queryable table: the root row source of a query.
    Table(ModelRef),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Constant(Constant),
    /// A lambda parameter: "the current row".
    Parameter(String),
    FieldAccess {
        target: Box<Expr>,
        field: String,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// A query operator (`target` is `None`) or an instance method call.
    Call {
        target: Option<Box<Expr>>,
        method: String,
        args: Vec<Expr>,
    },
    Lambda {
        params: Vec<String>,
        body: Box<Expr>,
    },
    /// A lambda passed as data.
    Quote(Box<Expr>),
    New {
        shape: ShapeKind,
        members: Vec<(String, Expr)>,
    },
}

/// An immutable query expression tree node.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    kind: ExprKind,
    ty: TypeRef,
}

impl Expr {
    pub fn new(kind: ExprKind, ty: TypeRef) -> Self {
        Self { kind, ty }
    }

    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    pub fn ty(&self) -> &TypeRef {
        &self.ty
    }

    /// Short name of the node kind, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            ExprKind::Constant(_) => "Constant",
            ExprKind::Parameter(_) => "Parameter",
            ExprKind::FieldAccess { .. } => "FieldAccess",
            ExprKind::Binary { .. } => "BinaryOp",
            ExprKind::Call { .. } => "MethodCall",
            ExprKind::Lambda { .. } => "Lambda",
            ExprKind::Quote(_) => "QuotedLambda",
            ExprKind::New { .. } => "NewObject",
        }
    }

    /// Whether this node reads from a row: its transitive root is a parameter.
    pub fn is_row_derived(&self) -> bool {
        match &self.kind {
            ExprKind::Parameter(_) => true,
            ExprKind::FieldAccess { target, .. } => target.is_row_derived(),
            ExprKind::Call {
                target: Some(target),
                ..
            } => target.is_row_derived(),
            ExprKind::Call { target: None, args, .. } => args.first().is_some_and(Expr::is_row_derived),
            ExprKind::Binary { left, right, .. } => left.is_row_derived() || right.is_row_derived(),
            _ => false,
        }
    }

    /// Strip `Quote` wrappers down to the lambda inside.
    pub fn unquote(&self) -> &Expr {
        match &self.kind {
            ExprKind::Quote(inner) => inner.unquote(),
            _ => self,
        }
    }
}
